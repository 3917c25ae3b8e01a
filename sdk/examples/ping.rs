//! Calls `demo:/ping` on a running `fabric-node`.
//!
//! ```text
//! cargo run -p fabric-sdk --example ping -- 127.0.0.1 4000 4001
//! ```

use fabric_core::{data, node::Node};
use fabric_sdk::FabricClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let stream_port: u16 = args.next().unwrap_or_else(|| "4000".to_string()).parse()?;
    let datagram_port: u16 = args.next().unwrap_or_else(|| "4001".to_string()).parse()?;

    let target = Node::new(address, stream_port, datagram_port);
    let client = FabricClient::connect(Node::new("127.0.0.1", 4100, 4101)).await?;

    let reply = client.call(target, "demo", "/ping", data::data()).await;
    println!("{:?}", reply.data);

    Ok(())
}
