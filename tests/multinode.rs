//! Localhost network tests: real listeners, bootstrap, gossip and replay

use slot_core::node::{launch, NodeConfig, NodeRole, RunningNode};
use std::time::{Duration, Instant};

fn founder_config() -> NodeConfig {
    NodeConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        seed: Some(42),
        hardness: Some("0".to_string()),
        slot_length_ms: 1_000,
        ..NodeConfig::default()
    }
}

fn joiner_config(founder: &RunningNode) -> NodeConfig {
    NodeConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        bootstrap: Some(founder.p2p_addr().to_string()),
        ..NodeConfig::default()
    }
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_joiner_receives_genesis_and_peers() {
    let founder = launch(founder_config()).await.unwrap();
    let joiner = launch(joiner_config(&founder)).await.unwrap();

    assert_eq!(joiner.node().genesis(), founder.node().genesis());
    assert_eq!(joiner.role(), NodeRole::Connected);
    assert_eq!(founder.role(), NodeRole::Producing);

    let joiner_address = joiner.node().own_peer().address.clone();
    let announced = wait_until(Duration::from_secs(5), || {
        founder
            .node()
            .list_peers()
            .iter()
            .any(|peer| peer.address == joiner_address)
    })
    .await;
    assert!(announced, "founder never learned about the joiner");

    joiner.shutdown();
    founder.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transfer_reaches_joiner_ledger() {
    let founder = launch(founder_config()).await.unwrap();
    let joiner = launch(joiner_config(&founder)).await.unwrap();

    let connected = wait_until(Duration::from_secs(5), || {
        founder.node().overlay().connection_count() >= 1
    })
    .await;
    assert!(connected, "joiner never connected to the founder");

    let recipient = joiner.node().public_key().clone();
    let tx_id = founder
        .node()
        .submit_transaction(recipient.clone(), 50)
        .unwrap();
    assert!(tx_id.starts_with(&founder.node().own_peer().address));

    let credited = wait_until(Duration::from_secs(15), || {
        matches!(joiner.node().balance(&recipient), Ok(50))
    })
    .await;
    assert!(credited, "transfer never showed up in the joiner's ledger");

    let founder_info = founder.node().info();
    assert!(founder_info.height >= 1);
    assert!(joiner.node().info().blocks >= 2);

    joiner.shutdown();
    founder.shutdown();
}

#[tokio::test]
async fn test_unreachable_bootstrap_founds_network() {
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = unused.local_addr().unwrap().to_string();
    drop(unused);

    let config = NodeConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        bootstrap: Some(address),
        ..NodeConfig::default()
    };
    let node = launch(config).await.unwrap();

    assert!(node.node().is_privileged());
    assert_eq!(node.role(), NodeRole::Producing);
    node.shutdown();
}
