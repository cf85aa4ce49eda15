//! Node runtime
//!
//! Startup sequence: bind the listener, bootstrap or found the network,
//! join the peer ring, announce, then run the accept loop, broadcaster,
//! slot ticker and optional RPC server as tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{found_network, now_ms, Node, NodeConfig, NodeError, NodeRole, SlotClock};
use crate::p2p::{MessageHandler, Overlay, OverlayError, Peer};
use crate::rpc::serve_rpc;

/// Handle to a running node
pub struct RunningNode {
    node: Arc<Node>,
    p2p_addr: SocketAddr,
    rpc_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningNode {
    /// The node
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Bound peer-to-peer address
    pub fn p2p_addr(&self) -> SocketAddr {
        self.p2p_addr
    }

    /// Bound RPC address, if RPC is enabled
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// Current lifecycle state
    pub fn role(&self) -> NodeRole {
        self.node.role()
    }

    /// Stop every task and drop all connections
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.node.overlay().disconnect_all();
        info!(address = %self.node.own_peer().address, "node stopped");
    }
}

/// Address peers should dial: the unspecified host becomes loopback
fn advertised_address(bound: SocketAddr) -> String {
    let mut address = bound;
    if address.ip().is_unspecified() {
        address.set_ip(std::net::Ipv4Addr::LOCALHOST.into());
    }
    address.to_string()
}

/// Start a node
///
/// Failing to bind the listener or receiving a malformed genesis block
/// aborts startup.
pub async fn launch(config: NodeConfig) -> Result<RunningNode, NodeError> {
    let keypair = config.keypair()?;
    let listener = TcpListener::bind(&config.listen_addr).await?;
    let p2p_addr = listener.local_addr()?;
    let own_address = config
        .advertise_addr
        .clone()
        .unwrap_or_else(|| advertised_address(p2p_addr));

    info!(address = %own_address, key = %keypair.public_key.short(), "starting node");

    let (peers, genesis) = match &config.bootstrap {
        Some(target) => match Overlay::bootstrap(target).await {
            Ok((peers, genesis)) => {
                info!(%target, peers = peers.len(), "bootstrapped");
                (peers, genesis)
            }
            Err(OverlayError::NoPeerReachable(_)) => {
                warn!(%target, "no peer reachable, founding a new network");
                (Vec::<Peer>::new(), found_network(&keypair, &config)?)
            }
            Err(e) => return Err(e.into()),
        },
        None => (Vec::new(), found_network(&keypair, &config)?),
    };

    let (overlay, outbound) = Overlay::new();
    let node = Arc::new(Node::new(keypair, own_address, genesis, peers, Arc::clone(&overlay))?);
    let handler: Arc<dyn MessageHandler> = node.clone();

    let mut tasks = vec![
        tokio::spawn(Arc::clone(&overlay).accept_loop(listener, Arc::clone(&handler))),
        tokio::spawn(outbound.run(Arc::clone(&overlay))),
    ];

    for neighbour in node.ring_neighbours(config.fan_out) {
        match overlay.connect(&neighbour.address, Arc::clone(&handler)).await {
            Ok(_) => info!(peer = %neighbour.address, "connected to neighbour"),
            Err(e) => warn!(peer = %neighbour.address, error = %e, "failed to dial neighbour"),
        }
    }
    node.announce();
    node.mark_connected();

    tasks.push(tokio::spawn(run_slot_ticker(Arc::clone(&node))));

    let rpc_addr = match &config.rpc_addr {
        Some(address) => {
            let rpc_listener = TcpListener::bind(address).await?;
            let bound = rpc_listener.local_addr()?;
            tasks.push(tokio::spawn(serve_rpc(rpc_listener, Arc::clone(&node))));
            Some(bound)
        }
        None => None,
    };

    Ok(RunningNode {
        node,
        p2p_addr,
        rpc_addr,
        tasks,
    })
}

/// Drive the node's slot counter from the genesis clock
async fn run_slot_ticker(node: Arc<Node>) {
    let clock = SlotClock::from_genesis(node.genesis());
    loop {
        tokio::time::sleep(clock.until_next_slot(now_ms())).await;
        node.on_slot(clock.slot_at(now_ms()));
    }
}
