//! End-to-end overlay scenarios over the channel transport.

use std::sync::Arc;
use std::time::Duration;

use shared_crypto::{EddsaKeyPair, HashCode};
use shared_types::{routeflags, BlockType, PeerId, Timestamp};

use node_runtime::{ChannelHub, ConnectionManager, Node, NodeConfig};
use r5n_blocks::{Block, HelloBlock, Query};
use r5n_engine::{HelloMsg, Message, TimeSource, Transport};
use r5n_revocation::{CancelToken, PowCalculation, RevocationBlock, RevocationStatus};
use r5n_routing::PeerAddress;

const NOW: Timestamp = Timestamp(1_000);

struct FixedTime(Timestamp);

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.0
    }
}

struct TestNode {
    node: Node,
    transport: Arc<node_runtime::ChannelTransport>,
    peer: PeerId,
    keypair_seed: u8,
}

impl TestNode {
    fn keypair(&self) -> EddsaKeyPair {
        EddsaKeyPair::from_seed([self.keypair_seed; 32])
    }

    fn address_key(&self) -> HashCode {
        *PeerAddress::from_peer_id(&self.peer).as_hash()
    }

    fn knows(&self, other: &TestNode) {
        self.node
            .engine()
            .routing()
            .write()
            .table
            .add(other.peer, true, NOW);
    }

    fn stored(&self) -> usize {
        self.node.engine().store().len()
    }
}

fn spawn_node(hub: &Arc<ChannelHub>, seed: u8) -> TestNode {
    let keypair = EddsaKeyPair::from_seed([seed; 32]);
    let peer = PeerId::new(*keypair.public_key().as_bytes());
    let (transport, frames) = hub.register(peer);
    let transport = Arc::new(transport);

    let node = Node::with_time(
        keypair,
        NodeConfig::for_testing(),
        transport.clone(),
        Arc::new(FixedTime(NOW)),
    );
    ConnectionManager::spawn_frame_loop(node.engine().clone(), transport.clone(), frames);

    TestNode {
        node,
        transport,
        peer,
        keypair_seed: seed,
    }
}

fn test_block(payload: &[u8]) -> Block {
    Block::new(BlockType::TEST, Timestamp::new(100_000), payload.to_vec())
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// S1: the closest node stores locally and forwards nothing.
#[tokio::test]
async fn scenario_put_stored_at_closest_node() {
    let hub = ChannelHub::new();
    let a = spawn_node(&hub, 1);
    let b = spawn_node(&hub, 2);
    a.knows(&b);

    // The key is A's own address, so A is trivially closest.
    let key = a.address_key();
    a.node
        .engine()
        .local_put(key, test_block(b"V"), 0, 2)
        .await;

    assert_eq!(a.stored(), 1);
    // Give any stray forward a chance to land, then confirm B saw
    // nothing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(b.stored(), 0);
}

/// S2: a node that is not closest forwards the PUT to its only peer.
#[tokio::test]
async fn scenario_put_forwarded_to_closer_node() {
    let hub = ChannelHub::new();
    let a = spawn_node(&hub, 1);
    let b = spawn_node(&hub, 2);
    a.knows(&b);

    let key = b.address_key();
    a.node
        .engine()
        .local_put(key, test_block(b"V"), 0, 2)
        .await;

    wait_until("B to store the forwarded block", || b.stored() == 1).await;
    assert_eq!(a.stored(), 0);
}

/// S3: a local GET over a locally stored value answers through the
/// responder with an empty get-path.
#[tokio::test]
async fn scenario_local_get_answers_locally() {
    let hub = ChannelHub::new();
    let a = spawn_node(&hub, 1);

    let key = a.address_key();
    a.node
        .engine()
        .local_put(key, test_block(b"V"), 0, 2)
        .await;

    let query = Query::new(key, BlockType::TEST, 0, vec![]);
    let mut rx = a.node.engine().local_get(query, 2).await;

    let result = rx.recv().await.expect("local result");
    assert_eq!(result.block_data, b"V");
    assert!(result.get_path.is_empty());
    assert!(result.put_path.is_empty());
}

/// S4: demultiplex + approximate returns the exact hit and a nearby
/// neighbor, tagged by distance.
#[tokio::test]
async fn scenario_approximate_get_returns_neighbors() {
    let hub = ChannelHub::new();
    let a = spawn_node(&hub, 1);
    let b = spawn_node(&hub, 2);
    a.knows(&b);

    let key = a.address_key();
    a.node
        .engine()
        .local_put(key, test_block(b"V"), 0, 2)
        .await;

    // A neighbor key at bit-length distance 4.
    let mut neighbor = *key.as_bytes();
    neighbor[63] ^= 0x08;
    let neighbor = HashCode::new(neighbor);
    a.node
        .engine()
        .store()
        .put(
            &neighbor,
            r5n_engine::DhtEntry {
                block: test_block(b"V'"),
                path: None,
            },
            NOW,
        )
        .unwrap();

    let query = Query::new(
        key,
        BlockType::TEST,
        routeflags::DEMULTIPLEX | routeflags::FIND_APPROXIMATE,
        vec![],
    );
    let mut rx = a.node.engine().local_get(query, 2).await;

    let first = rx.recv().await.expect("exact result");
    let second = rx.recv().await.expect("approximate neighbor");

    assert_eq!(first.block_data, b"V");
    assert!(!first.has_flag(routeflags::FIND_APPROXIMATE));
    assert_eq!(second.block_data, b"V'");
    assert!(second.has_flag(routeflags::FIND_APPROXIMATE));
}

/// S5: the revocation ladder: a computed sequence reports its
/// difficulty, and a single swapped proof breaks strict ordering.
#[tokio::test]
async fn scenario_revocation_compute_verify_tamper() {
    let keypair = EddsaKeyPair::from_seed([0x51; 32]);
    let mut calc = PowCalculation::new(keypair.public_key(), NOW);
    calc.compute(0, &CancelToken::new()).unwrap();

    let mut block = RevocationBlock::from_pow(&calc, &keypair).unwrap();
    for pair in block.pows.windows(2) {
        assert!(pair[0] < pair[1], "solved proofs come out ascending");
    }

    // The measured difficulty is reported as a non-negative code.
    let status = block.verify(true, NOW.add_secs(1));
    assert!(status.code() >= 0, "got {status:?}");

    // Tamper pow[15] so it collides with pow[16].
    block.pows[15] = block.pows[16];
    assert_eq!(
        block.verify(true, NOW.add_secs(1)),
        RevocationStatus::NotAscending
    );
    assert_eq!(block.verify(true, NOW.add_secs(1)).code(), -3);
}

/// S6: a HELLO from an unknown peer is learned, greeted back, and
/// not re-cached on equal expiration.
#[tokio::test]
async fn scenario_hello_exchange() {
    let hub = ChannelHub::new();
    let a = spawn_node(&hub, 1);
    let b = spawn_node(&hub, 2);

    let hello = HelloMsg::sign(
        &b.keypair(),
        Timestamp::new(50_000),
        vec!["udp://192.0.2.2:2086".to_string()],
    );
    b.transport
        .send(&a.peer, Message::Hello(hello.clone()))
        .await
        .unwrap();

    // A learns B and greets back; B then learns A.
    wait_until("A to learn B", || {
        a.node.engine().routing().read().table.lookup(&b.peer).is_some()
    })
    .await;
    wait_until("B to receive A's greeting", || {
        b.node.engine().routing().read().table.lookup(&a.peer).is_some()
    })
    .await;
    assert_eq!(a.node.engine().routing().read().hellos.len(), 1);

    // The same HELLO again: equal expiration, cache untouched.
    b.transport
        .send(&a.peer, Message::Hello(hello))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(a.node.engine().routing().read().hellos.len(), 1);
}

/// A GET travels to the closer node and its RESULT is proxied back
/// along the reverse path.
#[tokio::test]
async fn scenario_get_routed_and_result_proxied() {
    let hub = ChannelHub::new();
    let a = spawn_node(&hub, 1);
    let b = spawn_node(&hub, 2);
    a.knows(&b);

    // B holds the value under its own address.
    let key = b.address_key();
    b.node
        .engine()
        .local_put(key, test_block(b"remote"), 0, 2)
        .await;
    assert_eq!(b.stored(), 1);

    let query = Query::new(key, BlockType::TEST, 0, vec![]);
    let mut rx = a.node.engine().local_get(query, 2).await;

    let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("result before timeout")
        .expect("proxied result");
    assert_eq!(result.block_data, b"remote");
}

/// A stored HELLO block is served back for HELLO GETs across nodes.
#[tokio::test]
async fn scenario_hello_block_put_and_get() {
    let hub = ChannelHub::new();
    let a = spawn_node(&hub, 1);
    let b = spawn_node(&hub, 2);
    a.knows(&b);

    // A third identity advertises itself through a signed block.
    let c_keys = EddsaKeyPair::from_seed([3; 32]);
    let hello = HelloBlock::sign(
        &c_keys,
        Timestamp::new(50_000),
        vec!["udp://192.0.2.3:2086".to_string()],
    );
    let key = hello.derive_key();

    // Stored at whichever of A/B is closer; a DEMULTIPLEX get from A
    // finds it either way.
    a.node
        .engine()
        .local_put(key, hello.to_block(), routeflags::DEMULTIPLEX, 2)
        .await;

    let query = Query::new(
        key,
        BlockType::DHT_URL_HELLO,
        routeflags::DEMULTIPLEX,
        vec![],
    );
    let mut rx = a.node.engine().local_get(query, 2).await;

    let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("result before timeout")
        .expect("HELLO result");
    let decoded = HelloBlock::decode(&result.block_data).expect("valid HELLO block");
    assert_eq!(decoded.peer_id, hello.peer_id);
}
