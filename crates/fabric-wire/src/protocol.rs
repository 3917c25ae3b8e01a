use std::sync::Arc;

use fabric_core::{cluster::Cluster, node::Node, request::Request};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::OnceCell,
};

use crate::codec::{self};

/// Datagrams are read into a buffer capped at this size (§4.7); a packet
/// that fills it is oversize and treated as a protocol error rather than
/// silently truncated.
const MAX_DATAGRAM_SIZE: usize = 4 * 1024;

/// The binary stream+datagram wire protocol (§4.7). Listens on a TCP port
/// for reliable request/reply traffic and a UDP port for connectionless
/// delivery, and implements [`fabric_core::protocol::Protocol`] so a
/// [`Cluster`] can reach any member through it.
///
/// `cluster` is filled in after construction: the cluster needs an
/// `Arc<dyn Protocol>` to exist, and the protocol needs the cluster to hand
/// decoded messages to, so the two are wired together via
/// [`WireProtocol::attach_cluster`] once both exist.
pub struct WireProtocol {
    local_node: Node,
    cluster: OnceCell<Arc<Cluster>>,
}

impl WireProtocol {
    pub fn new(local_node: Node) -> Arc<Self> {
        Arc::new(Self {
            local_node,
            cluster: OnceCell::new(),
        })
    }

    pub fn attach_cluster(&self, cluster: Arc<Cluster>) {
        self.cluster.set(cluster).ok();
    }

    fn cluster(&self) -> &Arc<Cluster> {
        self.cluster
            .get()
            .expect("WireProtocol::attach_cluster must run before the protocol serves traffic")
    }

    /// Accept stream connections forever, spawning one task per connection.
    /// Each connection is read as a sequence of length-prefixed frames
    /// until the peer closes it (§4.7 stream framing).
    pub async fn serve_stream(self: Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.local_node.stream_addr()).await?;
        log::info!("fabric-wire stream listener bound on {}", self.local_node.stream_addr());

        loop {
            let (socket, peer) = listener.accept().await?;
            let protocol = self.clone();
            tokio::spawn(async move {
                if let Err(error) = protocol.serve_connection(socket).await {
                    log::warn!("stream connection from {peer} ended: {error}");
                }
            });
        }
    }

    async fn serve_connection(&self, mut socket: TcpStream) -> std::io::Result<()> {
        let mut buffer = Vec::new();

        loop {
            // Read the 4-byte length prefix, then exactly that many more
            // bytes, growing `buffer` to fit rather than capping frame size.
            let mut prefix = [0u8; 4];
            if socket.read_exact(&mut prefix).await.is_err() {
                return Ok(());
            }

            let body_len = u32::from_be_bytes(prefix) as usize;
            buffer.clear();
            buffer.extend_from_slice(&prefix);
            buffer.resize(4 + body_len, 0);
            socket.read_exact(&mut buffer[4..]).await?;

            match codec::decode(&buffer) {
                Ok(message) => self.cluster().receive(message).await,
                Err(error) => log::warn!("dropping malformed stream frame: {error}"),
            }
        }
    }

    /// Receive datagrams forever; each packet is exactly one frame (§4.7
    /// datagram framing).
    pub async fn serve_datagram(self: Arc<Self>) -> std::io::Result<()> {
        let socket = UdpSocket::bind(self.local_node.datagram_addr()).await?;
        log::info!("fabric-wire datagram listener bound on {}", self.local_node.datagram_addr());

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, peer) = socket.recv_from(&mut buffer).await?;
            if len == MAX_DATAGRAM_SIZE {
                log::warn!("dropping oversize datagram from {peer}: exceeds {MAX_DATAGRAM_SIZE} byte limit");
                continue;
            }

            match codec::decode(&buffer[..len]) {
                Ok(message) => self.cluster().receive(message).await,
                Err(error) => log::warn!("dropping malformed datagram frame from {peer}: {error}"),
            }
        }
    }
}

#[async_trait::async_trait]
impl fabric_core::protocol::Protocol for WireProtocol {
    async fn send(&self, node: Node, request: Arc<Request>) {
        if node == self.local_node {
            // Local short-circuit: never touch the network for a message
            // addressed to the node that's sending it.
            self.cluster().receive(request.message.clone()).await;
            return;
        }

        let encoded = codec::encode(&request.message);
        match TcpStream::connect(node.stream_addr()).await {
            Ok(mut socket) => {
                if let Err(error) = socket.write_all(&encoded).await {
                    log::warn!("failed writing frame to {node}: {error}");
                }
            }
            Err(error) => log::warn!("failed connecting to {node}: {error}"),
        }
    }

    fn name(&self) -> &'static str {
        "nrv"
    }
}
