//! Distributed search engine: flooding, random walk, depth-first.
//!
//! One engine per node. All mutable search state (the duplicate-suppression
//! set, depth-first walk bookkeeping, statistics) lives behind a single
//! mutex. Forwarding decisions are computed under the lock; the sends happen
//! after it is released.

use super::message::{Frame, Payload, SearchMode};
use super::neighbors::NeighborTable;
use super::pool::ConnectionPool;
use super::types::{PeerAddr, SearchId};
use crate::stats::SearchStats;
use crate::store::LocalStore;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of `initiate`, reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initiated {
    /// The key was in the local store; no frames were sent.
    LocalHit(String),
    /// A search left this node under the given sequence number.
    Launched(u64),
}

/// Depth-first bookkeeping for one search passing through this node.
///
/// A depth-first search is a single token walking the overlay: each node
/// remembers who first handed it the token and which neighbors the token
/// has already been exchanged with. Revisits (backtracks and cross-edge
/// arrivals) are admitted past the duplicate-suppression set and consumed
/// here instead.
struct WalkState {
    /// Who handed us the search first; `None` when we originated it.
    parent: Option<PeerAddr>,
    /// Neighbors this search already came from or was handed to.
    tried: HashSet<PeerAddr>,
}

/// What to do with a depth-first token after a walk step.
enum WalkStep {
    Forward(PeerAddr),
    Backtrack(PeerAddr),
    NotLocatable,
    Dead,
}

#[derive(Default)]
struct EngineState {
    seen: HashSet<SearchId>,
    walks: HashMap<SearchId, WalkState>,
    stats: SearchStats,
}

pub struct SearchEngine {
    local: PeerAddr,
    store: Arc<LocalStore>,
    neighbors: Arc<NeighborTable>,
    pool: Arc<ConnectionPool>,
    /// Next sequence number for frames originated here.
    seqno: AtomicU64,
    default_ttl: AtomicU32,
    state: Mutex<EngineState>,
}

impl SearchEngine {
    pub fn new(
        local: PeerAddr,
        store: Arc<LocalStore>,
        neighbors: Arc<NeighborTable>,
        pool: Arc<ConnectionPool>,
        default_ttl: u32,
    ) -> Self {
        Self {
            local,
            store,
            neighbors,
            pool,
            seqno: AtomicU64::new(1),
            default_ttl: AtomicU32::new(default_ttl.max(1)),
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn default_ttl(&self) -> u32 {
        self.default_ttl.load(Ordering::Relaxed)
    }

    pub fn set_default_ttl(&self, ttl: u32) {
        self.default_ttl.store(ttl.max(1), Ordering::Relaxed);
    }

    /// Allocate the next sequence number.
    pub fn next_seqno(&self) -> u64 {
        self.seqno.fetch_add(1, Ordering::Relaxed)
    }

    /// Start a search for `key`. A local hit is reported without touching
    /// the network; otherwise the freshly built frame runs through the same
    /// relay pipeline as frames arriving off the wire, with this node as
    /// the first relay.
    pub async fn initiate(&self, mode: SearchMode, key: &str) -> Initiated {
        if let Some(value) = self.store.get(key) {
            info!("{key} = {value} (local store)");
            return Initiated::LocalHit(value.to_string());
        }

        let seqno = self.next_seqno();
        let frame = Frame::new(
            self.local.clone(),
            seqno,
            self.default_ttl(),
            Payload::Search {
                mode,
                last_hop_port: self.local.port,
                key: key.to_string(),
                hop_count: 0,
            },
        );
        debug!("launching {mode} search #{seqno} for {key}");
        self.relay(frame, None).await;
        Initiated::Launched(seqno)
    }

    /// Handle a SEARCH frame received from the wire. `remote_ip` is the
    /// address of the socket it arrived on, used as a fallback when the
    /// last hop's port is not in the neighbor table.
    pub async fn on_search(&self, frame: Frame, remote_ip: Option<IpAddr>) {
        self.relay(frame, remote_ip).await;
    }

    /// Handle a VAL frame: a reply to a search this node initiated. Replies
    /// for unknown searches are tallied all the same; the protocol carries
    /// no state to tell a stale answer from a live one.
    pub async fn on_val(&self, frame: Frame) {
        let Payload::Val { mode, ref key, ref value, hop_count } = frame.payload else {
            return;
        };
        {
            let mut state = self.state.lock().await;
            state.stats.record(mode, hop_count);
            // A depth-first walk is over once its answer is in.
            state.walks.remove(&SearchId {
                origin: self.local.clone(),
                seqno: frame.seqno,
            });
        }
        info!(
            "{key} = {value} ({mode} search, {hop_count} hops, answered by {})",
            frame.origin
        );
    }

    /// Handle a BYE: the peer leaves the overlay.
    pub async fn on_bye(&self, origin: &PeerAddr) {
        if self.neighbors.remove(origin).await {
            info!("peer departed: {origin}");
        }
        self.pool.evict(origin).await;
    }

    /// The relay pipeline shared by `initiate` and `on_search`.
    async fn relay(&self, frame: Frame, remote_ip: Option<IpAddr>) {
        let (mode, last_hop_port, key, hop_count) = match &frame.payload {
            Payload::Search { mode, last_hop_port, key, hop_count } => {
                (*mode, *last_hop_port, key.clone(), *hop_count)
            }
            _ => return,
        };
        let id = frame.search_id();
        let originated = frame.origin == self.local;

        // Admission: flooding and random-walk duplicates stop here; a
        // depth-first revisit is a backtrack (or a cross edge) and carries
        // on into the walk logic as long as the walk is still live.
        {
            let mut state = self.state.lock().await;
            let first_sight = state.seen.insert(id.clone());
            if !first_sight {
                match mode {
                    SearchMode::DepthFirst if state.walks.contains_key(&id) => {}
                    SearchMode::DepthFirst => {
                        debug!("depth-first search {id} already concluded, dropped");
                        return;
                    }
                    _ => {
                        debug!("duplicate {mode} search {id}, dropped");
                        return;
                    }
                }
            } else if !originated {
                // First sight of somebody else's search: answer from the
                // local store if we can, outside the lock.
                drop(state);
                if let Some(value) = self.store.get(&key) {
                    self.reply(&frame, mode, &key, value, hop_count).await;
                    return;
                }
            }
        }

        // Hop accounting: one relay step consumes one TTL unit.
        let ttl = frame.ttl.saturating_sub(1);
        if ttl == 0 {
            debug!("ttl exhausted for {id}, dropped");
            if mode == SearchMode::DepthFirst {
                self.state.lock().await.walks.remove(&id);
            }
            return;
        }
        let hop_count = hop_count + 1;

        // At the launch step there is no previous forwarder to avoid;
        // relays skip whoever handed them the frame.
        let exclude_port = remote_ip.map(|_| last_hop_port);

        match mode {
            SearchMode::Flooding => {
                let targets: Vec<PeerAddr> = self
                    .neighbors
                    .list()
                    .await
                    .into_iter()
                    .filter(|p| exclude_port != Some(p.port))
                    .collect();
                if targets.is_empty() {
                    debug!("no flooding targets for {id}");
                    return;
                }
                let out = self.search_frame(&frame, mode, &key, ttl, hop_count);
                for peer in targets {
                    self.forward(&peer, &out).await;
                }
            }

            SearchMode::RandomWalk => {
                // Prefer not to bounce straight back, but a dead end walks
                // the frame back to the sender rather than dropping it.
                let next = match exclude_port {
                    Some(port) => match self.neighbors.choose_random_excluding(port).await {
                        Some(peer) => Some(peer),
                        None => self.neighbors.choose_random().await,
                    },
                    None => self.neighbors.choose_random().await,
                };
                match next {
                    Some(peer) => {
                        let out = self.search_frame(&frame, mode, &key, ttl, hop_count);
                        self.forward(&peer, &out).await;
                    }
                    None => debug!("no neighbors to walk {id}"),
                }
            }

            SearchMode::DepthFirst => {
                let sender = match remote_ip {
                    // Launched here: the walk has no predecessor.
                    None => None,
                    Some(ip) => Some(self.resolve_last_hop(last_hop_port, ip).await),
                };
                let step = self.step_walk(&id, sender).await;
                match step {
                    WalkStep::Forward(peer) => {
                        let out = self.search_frame(&frame, mode, &key, ttl, hop_count);
                        self.forward(&peer, &out).await;
                    }
                    WalkStep::Backtrack(peer) => {
                        debug!("backtracking {id} to {peer}");
                        let out = self.search_frame(&frame, mode, &key, ttl, hop_count);
                        self.forward(&peer, &out).await;
                    }
                    WalkStep::NotLocatable => {
                        info!("key {key} not locatable (search {id})");
                    }
                    WalkStep::Dead => {
                        debug!("depth-first search {id} has nowhere to go, dropped");
                    }
                }
            }
        }
    }

    /// Advance the depth-first walk at this node by one step.
    async fn step_walk(&self, id: &SearchId, sender: Option<PeerAddr>) -> WalkStep {
        let neighbors = self.neighbors.list().await;
        let mut state = self.state.lock().await;

        let walk = state.walks.entry(id.clone()).or_insert_with(|| WalkState {
            parent: sender.clone(),
            tried: HashSet::new(),
        });
        if let Some(sender) = sender {
            walk.tried.insert(sender);
        }

        let candidates: Vec<&PeerAddr> =
            neighbors.iter().filter(|p| !walk.tried.contains(*p)).collect();

        if candidates.is_empty() {
            // Exhausted: hand the token back, or conclude at the origin.
            // Either way this node is done with the walk.
            let parent = walk.parent.clone();
            state.walks.remove(id);
            return match parent {
                Some(parent) => WalkStep::Backtrack(parent),
                None if id.origin == self.local => WalkStep::NotLocatable,
                None => WalkStep::Dead,
            };
        }

        let next = candidates[rand::thread_rng().gen_range(0..candidates.len())].clone();
        walk.tried.insert(next.clone());
        WalkStep::Forward(next)
    }

    /// Answer a search from the local store, straight to its originator.
    async fn reply(&self, frame: &Frame, mode: SearchMode, key: &str, value: &str, hop_count: u32) {
        info!("hit for {key}, replying to {}", frame.origin);
        let val = Frame::new(
            self.local.clone(),
            frame.seqno,
            frame.ttl,
            Payload::Val {
                mode,
                key: key.to_string(),
                value: value.to_string(),
                hop_count,
            },
        );
        if let Err(e) = self.pool.send(&frame.origin, &val).await {
            warn!("failed to deliver result to {}: {e}", frame.origin);
        }
    }

    /// Outgoing SEARCH frame: same origin and seqno, this node as last hop.
    fn search_frame(
        &self,
        frame: &Frame,
        mode: SearchMode,
        key: &str,
        ttl: u32,
        hop_count: u32,
    ) -> Frame {
        Frame::new(
            frame.origin.clone(),
            frame.seqno,
            ttl,
            Payload::Search {
                mode,
                last_hop_port: self.local.port,
                key: key.to_string(),
                hop_count,
            },
        )
    }

    async fn forward(&self, peer: &PeerAddr, frame: &Frame) {
        debug!("forwarding {} to {peer}", frame.search_id());
        if let Err(e) = self.pool.send(peer, frame).await {
            warn!("failed to forward to {peer}: {e}");
        }
    }

    /// The previous forwarder as a full address. The frame only carries its
    /// port; the neighbor table resolves it, with the inbound socket's IP
    /// as the fallback for peers we never greeted.
    async fn resolve_last_hop(&self, port: u16, remote_ip: IpAddr) -> PeerAddr {
        match self.neighbors.find_by_port(port).await {
            Some(peer) => peer,
            None => PeerAddr::new(remote_ip.to_string(), port),
        }
    }

    /// Whether this node has already processed the given search.
    pub async fn has_seen(&self, id: &SearchId) -> bool {
        self.state.lock().await.seen.contains(id)
    }

    pub async fn seen_len(&self) -> usize {
        self.state.lock().await.seen.len()
    }

    /// Depth-first walks this node currently holds state for.
    pub async fn pending_walks(&self) -> usize {
        self.state.lock().await.walks.len()
    }

    pub async fn stats_snapshot(&self) -> SearchStats {
        self.state.lock().await.stats.clone()
    }
}
