//! Connection overlay
//!
//! Owns the set of live connections. Each connection runs a reader task that
//! decodes frames and hands them to the registered handler, and a writer task
//! that drains the connection's own queue. Broadcasts go through a single
//! outbound queue drained by one broadcaster task.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::{read_message, write_message, Message, Peer, ProtocolError};
use crate::constants::BOOTSTRAP_TIMEOUT;
use crate::consensus::GenesisBlock;
use crate::crypto::SchnorrSignature;

/// Local handle for one live connection
pub type ConnectionId = u64;

/// Overlay errors
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("No peer reachable at {0}")]
    NoPeerReachable(String),
    #[error("Bootstrap from {target} failed: {reason}")]
    BootstrapFailed { target: String, reason: String },
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity of flooded content, for the seen set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentId {
    Transaction(String),
    Block(SchnorrSignature),
    Peer(String),
}

/// Receives every decoded inbound message
///
/// A returned message is sent back on the same connection only.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, connection: ConnectionId, message: Message) -> Option<Message>;
}

struct Connection {
    remote: SocketAddr,
    sender: mpsc::UnboundedSender<Message>,
    tasks: [JoinHandle<()>; 2],
}

/// Live connections plus the flood dedup set
pub struct Overlay {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    seen: Mutex<HashSet<ContentId>>,
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<Message>,
}

/// Receiving end of the broadcast queue
pub struct Outbound(mpsc::UnboundedReceiver<Message>);

impl Outbound {
    /// Fan every queued message out to all live connections
    pub async fn run(mut self, overlay: Arc<Overlay>) {
        while let Some(message) = self.0.recv().await {
            overlay.send_to_all(&message);
        }
    }

    /// Take a queued message without waiting
    pub fn try_next(&mut self) -> Option<Message> {
        self.0.try_recv().ok()
    }
}

impl Overlay {
    /// Create an overlay with no connections
    pub fn new() -> (Arc<Self>, Outbound) {
        let (outbound, queue) = mpsc::unbounded_channel();
        let overlay = Arc::new(Self {
            connections: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            outbound,
        });
        (overlay, Outbound(queue))
    }

    /// Register a stream and start its reader and writer tasks
    pub fn attach(
        self: &Arc<Self>,
        stream: TcpStream,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConnectionId, OverlayError> {
        let remote = stream.peer_addr()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mut reader, mut writer) = stream.into_split();
        let (sender, mut queue) = mpsc::unbounded_channel::<Message>();

        // Held until the entry exists, so a reader that fails at once still finds it
        let mut connections = self.connections.lock();

        let writer_task = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                trace!(connection = id, command = message.command(), "send");
                if let Err(e) = write_message(&mut writer, &message).await {
                    debug!(connection = id, error = %e, "write failed");
                    break;
                }
            }
        });

        let overlay = Arc::clone(self);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_message(&mut reader).await {
                    Ok(Some(message)) => {
                        trace!(connection = id, command = message.command(), "recv");
                        if let Some(reply) = handler.on_message(id, message) {
                            let _ = overlay.send_to(id, reply);
                        }
                    }
                    Ok(None) => {
                        debug!(connection = id, "peer closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(connection = id, error = %e, "dropping connection on malformed input");
                        break;
                    }
                }
            }
            overlay.remove(id);
        });

        connections.insert(
            id,
            Connection {
                remote,
                sender,
                tasks: [reader_task, writer_task],
            },
        );
        debug!(connection = id, %remote, "connection attached");
        Ok(id)
    }

    /// Dial a peer and attach the connection
    pub async fn connect(
        self: &Arc<Self>,
        address: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConnectionId, OverlayError> {
        let stream = TcpStream::connect(address).await?;
        self.attach(stream, handler)
    }

    /// Accept inbound connections; transient accept errors are logged and skipped
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener, handler: Arc<dyn MessageHandler>) {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    if let Err(e) = self.attach(stream, Arc::clone(&handler)) {
                        warn!(%remote, error = %e, "failed to attach inbound connection");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }

    fn remove(&self, id: ConnectionId) {
        if let Some(connection) = self.connections.lock().remove(&id) {
            debug!(connection = id, remote = %connection.remote, "connection removed");
        }
    }

    /// Queue a message for one connection
    pub fn send_to(&self, id: ConnectionId, message: Message) -> Result<(), OverlayError> {
        let connections = self.connections.lock();
        let connection = connections
            .get(&id)
            .ok_or(OverlayError::ConnectionClosed(id))?;
        connection
            .sender
            .send(message)
            .map_err(|_| OverlayError::ConnectionClosed(id))
    }

    fn send_to_all(&self, message: &Message) {
        let connections = self.connections.lock();
        for connection in connections.values() {
            let _ = connection.sender.send(message.clone());
        }
    }

    /// Enqueue a message for every live connection
    pub fn broadcast(&self, message: Message) {
        let _ = self.outbound.send(message);
    }

    /// Record content as seen; true only the first time
    pub fn mark_seen(&self, content: ContentId) -> bool {
        self.seen.lock().insert(content)
    }

    /// Broadcast content the first time it is seen
    ///
    /// Returns true if the message was queued.
    pub fn flood(&self, content: ContentId, message: Message) -> bool {
        if !self.mark_seen(content) {
            return false;
        }
        self.broadcast(message);
        true
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Abort every connection task and forget the connections
    pub fn disconnect_all(&self) {
        let drained: Vec<Connection> = self.connections.lock().drain().map(|(_, c)| c).collect();
        for connection in drained {
            for task in &connection.tasks {
                task.abort();
            }
        }
    }

    /// Fetch the peer list and genesis block from `target`
    ///
    /// Uses a short-lived connection of its own. A failed dial means nobody
    /// is there and is reported as `NoPeerReachable`.
    pub async fn bootstrap(target: &str) -> Result<(Vec<Peer>, GenesisBlock), OverlayError> {
        let no_peer = || OverlayError::NoPeerReachable(target.to_string());
        let failed = |reason: String| OverlayError::BootstrapFailed {
            target: target.to_string(),
            reason,
        };

        let mut stream = match timeout(BOOTSTRAP_TIMEOUT, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(%target, error = %e, "bootstrap dial failed");
                return Err(no_peer());
            }
            Err(_) => return Err(no_peer()),
        };

        write_message(&mut stream, &Message::RequestInitInfo).await?;

        match timeout(BOOTSTRAP_TIMEOUT, read_message(&mut stream)).await {
            Ok(Ok(Some(Message::InitInfo { peers, genesis }))) => Ok((peers, genesis)),
            Ok(Ok(Some(other))) => Err(failed(format!("unexpected reply {}", other.command()))),
            Ok(Ok(None)) => Err(failed("connection closed".to_string())),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(failed("timed out".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    struct Echo;

    impl MessageHandler for Echo {
        fn on_message(&self, _connection: ConnectionId, message: Message) -> Option<Message> {
            match message {
                Message::RequestInitInfo => None,
                other => Some(other),
            }
        }
    }

    fn announce(address: &str) -> Message {
        Message::NewPeer(Peer::new(address, KeyPair::generate().public_key))
    }

    #[test]
    fn test_flood_only_once() {
        let (overlay, mut outbound) = Overlay::new();
        let message = announce("a:1");

        assert!(overlay.flood(ContentId::Peer("a:1".into()), message.clone()));
        assert!(!overlay.flood(ContentId::Peer("a:1".into()), message.clone()));

        assert_eq!(outbound.try_next(), Some(message));
        assert_eq!(outbound.try_next(), None);
    }

    #[test]
    fn test_send_to_unknown_connection_fails() {
        let (overlay, _outbound) = Overlay::new();
        assert!(matches!(
            overlay.send_to(99, Message::RequestInitInfo),
            Err(OverlayError::ConnectionClosed(99))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(matches!(
            Overlay::bootstrap(&address).await,
            Err(OverlayError::NoPeerReachable(_))
        ));
    }

    #[tokio::test]
    async fn test_reply_goes_back_on_same_connection() {
        let (server, _server_outbound) = Overlay::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(Arc::clone(&server).accept_loop(listener, Arc::new(Echo)));

        let mut stream = TcpStream::connect(&address).await.unwrap();
        let message = announce("b:1");
        write_message(&mut stream, &message).await.unwrap();

        let reply = timeout(BOOTSTRAP_TIMEOUT, read_message(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, Some(message));
        assert_eq!(server.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_drops_connection() {
        use tokio::io::AsyncWriteExt;

        let (server, _server_outbound) = Overlay::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(Arc::clone(&server).accept_loop(listener, Arc::new(Echo)));

        let mut stream = TcpStream::connect(&address).await.unwrap();
        stream.write_all(b"JUNKJUNKJUNK").await.unwrap();

        let closed = timeout(BOOTSTRAP_TIMEOUT, read_message(&mut stream)).await.unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(server.connection_count(), 0);
    }
}
