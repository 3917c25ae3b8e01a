use std::fs::read_to_string;

use clap::Parser;
use fabric_core::node::Node;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct NodeConfig {
    /// address this node advertises to the rest of the cluster.
    #[serde(default = "NodeConfig::address")]
    pub address: String,

    /// port the binary stream+datagram protocol's TCP listener binds.
    #[serde(default = "NodeConfig::stream_port")]
    pub stream_port: u16,

    /// port the binary protocol's UDP listener binds.
    #[serde(default = "NodeConfig::datagram_port")]
    pub datagram_port: u16,
}

impl NodeConfig {
    fn address() -> String {
        "127.0.0.1".to_string()
    }

    fn stream_port() -> u16 {
        4000
    }

    fn datagram_port() -> u16 {
        4001
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: Self::address(),
            stream_port: Self::stream_port(),
            datagram_port: Self::datagram_port(),
        }
    }
}

impl NodeConfig {
    pub fn to_node(&self) -> Node {
        Node::new(self.address.clone(), self.stream_port, self.datagram_port)
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    #[serde(rename = "wire")]
    #[default]
    Wire,
    #[serde(rename = "http")]
    Http,
}

#[derive(Deserialize, Debug)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,

    /// which wire protocol this process serves traffic over.
    #[serde(default)]
    pub protocol: Protocol,

    /// other members (`address:stream_port:datagram_port`) to join this
    /// node's default demo service ring with at startup.
    #[serde(default)]
    pub peers: Vec<String>,

    /// when serving the HTTP protocol, the service every inbound request
    /// routes to regardless of its `Host` header (§4.8). Absent means
    /// route by `Host` header as usual.
    #[serde(default)]
    pub default_service: Option<String>,

    #[serde(default)]
    pub log: Log,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// path to a json5 configuration file; defaults are used for anything
    /// it omits, and for every field when no file is given at all.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let cli = Cli::parse();
        let raw = match cli.config {
            Some(path) => read_to_string(path)?,
            None => "{}".to_string(),
        };

        Ok(serde_json5::from_str(&raw)?)
    }
}
