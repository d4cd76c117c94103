//! GET/PUT/RESULT/HELLO processing.
//!
//! One engine instance serves one node. The transport hands every
//! inbound message to [`MessageEngine::handle_message`] together
//! with the sender identity and a responder back-channel; the engine
//! answers locally, forwards, or both, according to the R5N decision
//! rules.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use shared_crypto::{EddsaKeyPair, HashCode};
use shared_types::{routeflags, BlockType, PeerId, RelativeTime, Timestamp};

use r5n_blocks::{Block, BlockHandlerRegistry, FilterResult, HelloBlock, PeerFilter, Query};
use r5n_routing::{HelloCache, PeerAddress, PeerCheck, RoutingConfig, RoutingTable, SelectionMode};

use crate::errors::EngineError;
use crate::path::Path;
use crate::ports::{LocalResponder, Recipient, Responder, TimeSource, Transport};
use crate::registry::{ResultHandler, ResultHandlerRegistry};
use crate::store::{Store, MAX_SORT_RESULTS};
use crate::wire::{GetMsg, HelloMsg, Message, PutMsg, ResultMsg};

/// Routing table plus the HELLO cache, guarded together: the cache
/// follows the table's single-writer / many-reader discipline.
pub struct RoutingState {
    pub table: RoutingTable,
    pub hellos: HelloCache,
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Addresses advertised in our own HELLOs.
    pub own_addresses: Vec<String>,
    /// Lifetime of our own HELLO advertisements.
    pub hello_lifetime: RelativeTime,
    /// Routing table configuration.
    pub routing: RoutingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            own_addresses: Vec::new(),
            hello_lifetime: RelativeTime::from_hours(12),
            routing: RoutingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn for_testing() -> Self {
        Self {
            own_addresses: vec!["test://127.0.0.1:0".to_string()],
            hello_lifetime: RelativeTime::from_hours(1),
            routing: RoutingConfig::for_testing(),
        }
    }
}

/// GET decision: (do_result, do_forward) from (closest, demux,
/// approx).
pub fn get_decision(closest: bool, demux: bool, approx: bool) -> (bool, bool) {
    let do_result = closest || (demux && approx);
    let do_forward = !closest || (demux && !approx);
    (do_result, do_forward)
}

/// PUT decision: (do_store, do_forward) from (closest, demux).
pub fn put_decision(closest: bool, demux: bool) -> (bool, bool) {
    (closest || demux, !closest || demux)
}

/// The R5N message engine.
pub struct MessageEngine {
    keypair: Arc<EddsaKeyPair>,
    local_id: PeerId,
    config: EngineConfig,
    routing: Arc<RwLock<RoutingState>>,
    store: Arc<dyn Store>,
    registry: Arc<ResultHandlerRegistry>,
    handlers: Arc<BlockHandlerRegistry>,
    transport: Arc<dyn Transport>,
    time: Arc<dyn TimeSource>,
    next_local_responder: AtomicU64,
}

impl MessageEngine {
    pub fn new(
        keypair: EddsaKeyPair,
        config: EngineConfig,
        store: Arc<dyn Store>,
        handlers: Arc<BlockHandlerRegistry>,
        transport: Arc<dyn Transport>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let local_id = PeerId::new(*keypair.public_key().as_bytes());
        let routing = RoutingState {
            table: RoutingTable::new(local_id, config.routing.clone()),
            hellos: HelloCache::new(config.routing.hello_cache_size),
        };
        Self {
            keypair: Arc::new(keypair),
            local_id,
            config,
            routing: Arc::new(RwLock::new(routing)),
            store,
            registry: Arc::new(ResultHandlerRegistry::new()),
            handlers,
            transport,
            time,
            next_local_responder: AtomicU64::new(1),
        }
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn routing(&self) -> &Arc<RwLock<RoutingState>> {
        &self.routing
    }

    pub fn registry(&self) -> &Arc<ResultHandlerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Dispatch one inbound message.
    pub async fn handle_message(
        &self,
        sender: PeerId,
        msg: Message,
        responder: Arc<dyn Responder>,
    ) {
        self.routing.write().table.touch(&sender, self.time.now());
        match msg {
            Message::Get(get) => self.handle_get(sender, get, responder).await,
            Message::Put(put) => self.handle_put(sender, put).await,
            Message::Result(result) => self.handle_result(sender, result).await,
            Message::Hello(hello) => self.handle_hello(sender, hello).await,
        }
    }

    /// Issue a GET on behalf of a local consumer; results arrive on
    /// the returned channel.
    pub async fn local_get(
        &self,
        query: Query,
        repl_level: u32,
    ) -> mpsc::UnboundedReceiver<ResultMsg> {
        let id = self.next_local_responder.fetch_add(1, Ordering::Relaxed);
        let (responder, rx) = LocalResponder::channel(id);
        let msg = GetMsg {
            block_type: query.block_type,
            flags: query.flags,
            hop_count: 0,
            repl_level,
            peer_filter: PeerFilter::new(),
            query_key: query.key,
            xquery: query.xquery,
            result_filter: Vec::new(),
        };
        self.handle_get(self.local_id, msg, Arc::new(responder)).await;
        rx
    }

    /// Store a block into the overlay on behalf of a local consumer.
    pub async fn local_put(&self, key: HashCode, block: Block, flags: u32, repl_level: u32) {
        let msg = PutMsg {
            block_type: block.block_type,
            flags,
            hop_count: 0,
            repl_level,
            peer_filter: PeerFilter::new(),
            expire: block.expire,
            key,
            truncated_origin: None,
            put_path: Vec::new(),
            block_data: block.payload,
        };
        self.handle_put(self.local_id, msg).await;
    }

    /// Process a GET request.
    pub async fn handle_get(&self, sender: PeerId, msg: GetMsg, responder: Arc<dyn Responder>) {
        let now = self.time.now();
        let handler = self.handlers.get(msg.block_type).clone();

        if !handler.validate_block_query(&msg.query_key, &msg.xquery) {
            warn!(%sender, block_type = %msg.block_type, "GET with invalid query, dropping");
            return;
        }
        self.check_peer_filter_anomaly(&sender, &msg.peer_filter, "GET");

        let mut rf = handler.parse_result_filter(&msg.result_filter);
        let mut pf = msg.peer_filter.clone();
        let target = PeerAddress::from_hash(msg.query_key);
        let hop_count = clamp_hops(msg.hop_count);

        let demux = msg.has_flag(routeflags::DEMULTIPLEX);
        let approx = msg.has_flag(routeflags::FIND_APPROXIMATE);
        let record_route = msg.has_flag(routeflags::RECORD_ROUTE);

        let closest = {
            let state = self.routing.read();
            state
                .table
                .is_closest_peer(None, &target, &|p| pf.contains(p), hop_count)
        };
        let (do_result, do_forward) = get_decision(closest, demux, approx);
        debug!(%sender, closest, demux, approx, do_result, do_forward, "GET decision");

        if do_result {
            let recipient = match responder.recipient() {
                Recipient::Peer(p) => p,
                Recipient::Local(_) => self.local_id,
            };

            // HELLO queries are served from the cache first.
            let mut replies: Vec<ResultMsg> = Vec::new();
            let hello_query = msg.block_type == BlockType::DHT_URL_HELLO
                || msg.block_type == BlockType::DHT_HELLO;
            if hello_query {
                let cached = {
                    let mut state = self.routing.write();
                    if approx {
                        state.hellos.lookup_closest(&target, MAX_SORT_RESULTS, now)
                    } else {
                        state.hellos.get(&target, now).into_iter().collect()
                    }
                };
                for hit in cached {
                    let block = Block::new(msg.block_type, hit.expire, hit.block);
                    if handler.filter_result(&block, &msg.query_key, &mut rf, &msg.xquery)
                        != FilterResult::More
                    {
                        continue;
                    }
                    replies.push(self.build_result(
                        &msg, block, None, false, record_route, recipient,
                    ));
                }
            }

            // Fall through to the store when the cache had nothing,
            // or always under approximate mode.
            if replies.is_empty() || approx {
                let query = Query::new(msg.query_key, msg.block_type, msg.flags, msg.xquery.clone());
                if approx {
                    for hit in self.store.get_approx(&query, &mut rf, now) {
                        let is_approx = hit.distance > 0;
                        replies.push(self.build_result(
                            &msg,
                            hit.entry.block,
                            hit.entry.path,
                            is_approx,
                            record_route,
                            recipient,
                        ));
                    }
                } else {
                    for entry in self.store.get(&query, &mut rf, now) {
                        replies.push(self.build_result(
                            &msg,
                            entry.block,
                            entry.path,
                            false,
                            record_route,
                            recipient,
                        ));
                    }
                }
            }

            for reply in replies {
                if let Err(err) = responder.respond(reply).await {
                    if err.is_transient() {
                        debug!(%err, "result delivery failed transiently");
                    } else {
                        warn!(%err, "result delivery failed");
                    }
                }
            }
        }

        if do_forward {
            pf.insert(&self.local_id);
            let (out_degree, targets) = self.select_forward_targets(&target, hop_count, msg.repl_level, &mut pf);
            if targets.is_empty() {
                debug!(out_degree, "no forwarding targets for GET");
                return;
            }

            // Future RESULTs from those targets are proxied back
            // through the captured responder.
            self.registry.register(ResultHandler {
                id: 0,
                query_key: msg.query_key,
                block_type: msg.block_type,
                flags: msg.flags,
                result_filter: rf.clone(),
                xquery: msg.xquery.clone(),
                started_at: now,
                responder,
            });

            let forwarded = GetMsg {
                hop_count: msg.hop_count.saturating_add(1),
                peer_filter: pf,
                result_filter: rf.to_bytes(),
                ..msg
            };
            for peer in targets {
                self.send_logged(&peer, Message::Get(forwarded.clone())).await;
            }
        }
    }

    /// Process a PUT request.
    pub async fn handle_put(&self, sender: PeerId, msg: PutMsg) {
        let now = self.time.now();
        if msg.expire.is_expired(now) {
            debug!(%sender, "dropping expired PUT");
            return;
        }

        let handler = self.handlers.get(msg.block_type).clone();
        let Some(block) = handler.parse_block(msg.block_type, msg.expire, &msg.block_data) else {
            warn!(%sender, block_type = %msg.block_type, "malformed PUT payload, dropping");
            return;
        };
        if !handler.validate_block_key(&block, &msg.key) {
            warn!(%sender, "PUT block does not match its key, dropping");
            return;
        }
        if !handler.validate_block_store_request(&block) {
            warn!(%sender, "PUT block failed store validation, dropping");
            return;
        }
        self.check_peer_filter_anomaly(&sender, &msg.peer_filter, "PUT");

        let record_route = msg.flags & routeflags::RECORD_ROUTE != 0;
        let demux = msg.flags & routeflags::DEMULTIPLEX != 0;
        let hop_count = clamp_hops(msg.hop_count);
        let target = PeerAddress::from_hash(msg.key);
        let mut pf = msg.peer_filter.clone();

        // A forged path never rejects the message; it shrinks to its
        // verified prefix.
        let mut path = Path::new(
            msg.put_path.clone(),
            msg.put_path.len(),
            sender,
            msg.truncated_origin,
        );
        if record_route {
            let (verified, truncated) = path.verify(&self.local_id);
            if truncated {
                debug!(%sender, verified, "put path truncated to verified prefix");
            }
        }

        let closest = {
            let state = self.routing.read();
            state
                .table
                .is_closest_peer(None, &target, &|p| pf.contains(p), hop_count)
        };
        let (do_store, do_forward) = put_decision(closest, demux);
        debug!(%sender, closest, demux, do_store, do_forward, "PUT decision");

        if do_store {
            let entry = crate::store::DhtEntry {
                block: block.clone(),
                path: record_route.then(|| path.clone()),
            };
            match self.store.put(&msg.key, entry, now) {
                Ok(()) => {}
                Err(err) if err.is_transient() => debug!(%err, "store refused PUT"),
                Err(err) => warn!(%err, "store failed on PUT"),
            }
        }

        // A HELLO block doubles as a connection hint: if its peer
        // would fit our table, dial the advertised addresses.
        if msg.block_type == BlockType::DHT_URL_HELLO {
            if let Ok(hello) = HelloBlock::decode(&block.payload) {
                self.maybe_connect_hello(&hello).await;
            }
        }

        if do_forward {
            pf.insert(&self.local_id);
            let (out_degree, targets) = self.select_forward_targets(&target, hop_count, msg.repl_level, &mut pf);
            if targets.is_empty() {
                debug!(out_degree, "no forwarding targets for PUT");
                return;
            }
            for peer in targets {
                let mut fwd_path = path.clone();
                if record_route {
                    fwd_path.extend(&self.keypair, peer, false);
                }
                let mut flags = msg.flags;
                if fwd_path.truncated_origin.is_some() {
                    flags |= routeflags::TRUNCATED;
                }
                let forwarded = PutMsg {
                    flags,
                    hop_count: msg.hop_count.saturating_add(1),
                    peer_filter: pf.clone(),
                    truncated_origin: fwd_path.truncated_origin,
                    put_path: if record_route {
                        fwd_path.elements
                    } else {
                        Vec::new()
                    },
                    ..msg.clone()
                };
                self.send_logged(&peer, Message::Put(forwarded)).await;
            }
        }
    }

    /// Process a RESULT, proxying it to every matching handler.
    pub async fn handle_result(&self, sender: PeerId, msg: ResultMsg) {
        let now = self.time.now();
        if msg.expire.is_expired(now) {
            debug!(%sender, "dropping expired RESULT");
            return;
        }

        let handler = self.handlers.get(msg.block_type).clone();
        let Some(block) = handler.parse_block(msg.block_type, msg.expire, &msg.block_data) else {
            warn!(%sender, "malformed RESULT payload, dropping");
            return;
        };
        let derived_key = handler.derive_block_key(&block);

        let mut path = Path::new(
            msg.put_path
                .iter()
                .chain(&msg.get_path)
                .cloned()
                .collect(),
            msg.put_path.len(),
            sender,
            msg.truncated_origin,
        );
        path.verify(&self.local_id);

        // HELLO results teach us addresses regardless of who asked.
        if msg.block_type == BlockType::DHT_URL_HELLO {
            if let Ok(hello) = HelloBlock::decode(&block.payload) {
                self.transport.learn(&hello.peer_id, &hello.addresses);
                self.routing.write().table.add(hello.peer_id, false, now);
            }
        }

        let msg_approx = msg.has_flag(routeflags::FIND_APPROXIMATE);
        let mut dispatches: Vec<(Arc<dyn Responder>, u64, bool)> = Vec::new();

        for entry in self.registry.lookup(&msg.query_key) {
            let mut registered = entry.lock();
            if !registered.block_type.is_any() && registered.block_type != msg.block_type {
                continue;
            }
            let wants_exact = registered.flags & routeflags::FIND_APPROXIMATE == 0;
            if wants_exact && msg_approx {
                continue;
            }
            if wants_exact {
                if let Some(derived) = derived_key {
                    if derived != msg.query_key {
                        warn!(%sender, "RESULT block key mismatch in exact mode, dropping message");
                        return;
                    }
                }
            }

            let xquery = registered.xquery.clone();
            match handler.filter_result(
                &block,
                &msg.query_key,
                &mut registered.result_filter,
                &xquery,
            ) {
                FilterResult::More => {
                    dispatches.push((registered.responder.clone(), registered.id, false));
                }
                FilterResult::Last => {
                    dispatches.push((registered.responder.clone(), registered.id, true));
                }
                FilterResult::Duplicate | FilterResult::Irrelevant => {}
            }
        }

        if dispatches.is_empty() {
            debug!(%sender, "RESULT matched no handler");
            return;
        }

        let forwarded = ResultMsg {
            put_path: path.put_path().to_vec(),
            get_path: path.get_path().to_vec(),
            truncated_origin: path.truncated_origin,
            ..msg.clone()
        };
        for (responder, handler_id, last) in dispatches {
            if let Err(err) = responder.respond(forwarded.clone()).await {
                if err.is_transient() {
                    debug!(%err, "result proxying failed transiently");
                } else {
                    warn!(%err, "result proxying failed");
                }
            }
            if last {
                self.registry.complete(&msg.query_key, handler_id);
            }
        }
    }

    /// Process a standalone HELLO from a directly connected peer.
    pub async fn handle_hello(&self, sender: PeerId, msg: HelloMsg) {
        let now = self.time.now();
        if msg.expire.is_expired(now) {
            debug!(%sender, "dropping expired HELLO");
            return;
        }
        if let Err(err) = msg.verify(&sender) {
            warn!(%sender, %err, "HELLO signature rejected");
            return;
        }

        let newly_known = self.transport.learn(&sender, &msg.addresses);

        {
            let mut state = self.routing.write();
            state.table.add(sender, true, now);
            // Re-wrap as a block so HELLO GETs can serve it.
            let hello_block = HelloBlock {
                peer_id: sender,
                expire: msg.expire,
                signature: msg.signature,
                addresses: msg.addresses.clone(),
            };
            state.hellos.insert(
                PeerAddress::from_peer_id(&sender),
                msg.expire,
                hello_block.encode(),
                now,
            );
        }

        if newly_known {
            info!(%sender, "learned new peer from HELLO, greeting back");
            let reply = self.own_hello(now);
            self.send_logged(&sender, Message::Hello(reply)).await;
        }
    }

    /// Periodic maintenance: expire handlers, store entries and
    /// cached HELLOs.
    pub fn heartbeat(&self) {
        let now = self.time.now();
        let handlers = self.registry.expire(now);
        let entries = self.store.expire_entries(now);
        let (hellos, stats) = {
            let mut state = self.routing.write();
            (state.hellos.gc(now), state.table.stats())
        };
        debug!(
            expired_handlers = handlers,
            expired_entries = entries,
            expired_hellos = hellos,
            peers = stats.total_peers,
            connected = stats.connected_peers,
            "heartbeat"
        );
    }

    /// Our own signed HELLO.
    pub fn own_hello(&self, now: Timestamp) -> HelloMsg {
        HelloMsg::sign(
            &self.keypair,
            now.add(self.config.hello_lifetime),
            self.config.own_addresses.clone(),
        )
    }

    fn build_result(
        &self,
        msg: &GetMsg,
        block: Block,
        stored_path: Option<Path>,
        approx: bool,
        record_route: bool,
        recipient: PeerId,
    ) -> ResultMsg {
        let mut flags = msg.flags & !routeflags::FIND_APPROXIMATE & !routeflags::TRUNCATED;
        if approx {
            flags |= routeflags::FIND_APPROXIMATE;
        }

        let (put_path, get_path, truncated_origin) = if record_route {
            let mut path = stored_path.unwrap_or_else(|| Path::empty(self.local_id));
            path.extend(&self.keypair, recipient, true);
            if path.truncated_origin.is_some() {
                flags |= routeflags::TRUNCATED;
            }
            (
                path.put_path().to_vec(),
                path.get_path().to_vec(),
                path.truncated_origin,
            )
        } else {
            (Vec::new(), Vec::new(), None)
        };

        ResultMsg {
            block_type: block.block_type,
            flags,
            expire: block.expire,
            query_key: msg.query_key,
            truncated_origin,
            put_path,
            get_path,
            block_data: block.payload,
        }
    }

    /// Pick forwarding targets, feeding each pick back into the peer
    /// filter so they stay distinct.
    fn select_forward_targets(
        &self,
        target: &PeerAddress,
        hop_count: u16,
        repl_level: u32,
        pf: &mut PeerFilter,
    ) -> (usize, Vec<PeerId>) {
        let state = self.routing.read();
        let out_degree = state.table.compute_out_degree(repl_level, hop_count);
        let mut targets = Vec::with_capacity(out_degree);
        for _ in 0..out_degree {
            let Some(entry) =
                state
                    .table
                    .select_peer(target, hop_count, &|p| pf.contains(p), SelectionMode::Auto)
            else {
                break;
            };
            pf.insert(&entry.peer_id);
            targets.push(entry.peer_id);
        }
        (out_degree, targets)
    }

    async fn maybe_connect_hello(&self, hello: &HelloBlock) {
        if hello.peer_id == self.local_id {
            return;
        }
        let check = self.routing.read().table.check(&hello.peer_id);
        if check != PeerCheck::Vacant {
            return;
        }
        self.transport.learn(&hello.peer_id, &hello.addresses);
        for address in &hello.addresses {
            if let Err(err) = self.transport.try_connect(&hello.peer_id, address).await {
                debug!(peer = %hello.peer_id, address, %err, "HELLO dial failed");
            }
        }
    }

    /// Warn-and-continue rule: prior hops add themselves to the peer
    /// filter, so a sender missing from it is an anomaly but never a
    /// reason to drop.
    fn check_peer_filter_anomaly(&self, sender: &PeerId, pf: &PeerFilter, kind: &str) {
        if sender != &self.local_id && !pf.contains(sender) {
            warn!(%sender, kind, "sender missing from peer filter (anomaly), processing anyway");
        }
    }

    async fn send_logged(&self, peer: &PeerId, msg: Message) {
        if let Err(err) = self.transport.send(peer, msg).await {
            if err.is_transient() {
                debug!(%peer, %err, "send failed transiently, continuing");
            } else {
                warn!(%peer, %err, "send failed");
            }
        }
    }
}

fn clamp_hops(hop_count: u32) -> u16 {
    hop_count.min(u16::MAX as u32) as u16
}
