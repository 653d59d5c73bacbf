//! Node runtime: listener, per-connection handlers, greetings, shutdown.

use super::message::{Frame, Payload};
use super::neighbors::NeighborTable;
use super::pool::ConnectionPool;
use super::search::SearchEngine;
use super::types::{GREETING_TTL, NetError, PeerAddr};
use crate::store::LocalStore;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Startup parameters for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address peers reach us at; also the listener bind address.
    pub local: PeerAddr,
    /// Seed neighbors, greeted on startup.
    pub neighbors: Vec<PeerAddr>,
    /// Key-value pairs held locally.
    pub keys: HashMap<String, String>,
    /// Initial default hop budget for searches originated here.
    pub default_ttl: u32,
}

pub struct Node {
    local: PeerAddr,
    neighbors: Arc<NeighborTable>,
    pool: Arc<ConnectionPool>,
    engine: Arc<SearchEngine>,
    shutdown: watch::Sender<bool>,
}

impl Node {
    /// Bind the listener, spawn the accept loop, and greet seed neighbors.
    pub async fn start(config: NodeConfig) -> Result<Arc<Node>, NetError> {
        let listener = TcpListener::bind(config.local.endpoint()).await?;

        let neighbors = Arc::new(NeighborTable::new(config.local.clone()));
        for peer in &config.neighbors {
            neighbors.add(peer.clone()).await;
        }
        let pool = Arc::new(ConnectionPool::new());
        let store = Arc::new(LocalStore::new(config.keys));
        if !store.is_empty() {
            info!("holding {} local keys", store.len());
        }
        let engine = Arc::new(SearchEngine::new(
            config.local.clone(),
            store,
            neighbors.clone(),
            pool.clone(),
            config.default_ttl,
        ));

        let (shutdown, _) = watch::channel(false);
        let node = Arc::new(Node {
            local: config.local,
            neighbors,
            pool,
            engine,
            shutdown,
        });

        info!("node listening at {}", node.local);
        tokio::spawn(accept_loop(node.clone(), listener));
        node.greet_all().await;
        Ok(node)
    }

    pub fn local(&self) -> &PeerAddr {
        &self.local
    }

    pub fn engine(&self) -> &Arc<SearchEngine> {
        &self.engine
    }

    pub fn neighbors(&self) -> &Arc<NeighborTable> {
        &self.neighbors
    }

    /// Send a HELLO to one peer, best-effort.
    pub async fn send_hello(&self, peer: &PeerAddr) {
        info!("sending HELLO to {peer}");
        let hello = self.greeting(Payload::Hello);
        if let Err(e) = self.pool.send(peer, &hello).await {
            warn!("failed to greet {peer}: {e}");
        }
    }

    /// Greet every current neighbor.
    pub async fn greet_all(&self) {
        for peer in self.neighbors.list().await {
            self.send_hello(&peer).await;
        }
    }

    /// Announce departure to every neighbor, close pooled connections, and
    /// stop the accept loop. Best-effort throughout; frames in transit may
    /// be lost.
    pub async fn shutdown(&self) {
        info!("shutting down");
        let bye = self.greeting(Payload::Bye);
        for peer in self.neighbors.list().await {
            if let Err(e) = self.pool.send(&peer, &bye).await {
                debug!("failed to send BYE to {peer}: {e}");
            }
        }
        self.pool.close_all().await;
        let _ = self.shutdown.send(true);
    }

    fn greeting(&self, payload: Payload) -> Frame {
        Frame::new(self.local.clone(), self.engine.next_seqno(), GREETING_TTL, payload)
    }

    /// Route one parsed frame to the component that owns its operation.
    async fn dispatch(&self, frame: Frame, reply: &mut OwnedWriteHalf, remote: SocketAddr) {
        if frame.ttl == 0 {
            debug!("frame with exhausted ttl from {}, dropped", frame.origin);
            return;
        }
        match frame.payload {
            Payload::Hello => {
                let origin = frame.origin;
                if self.neighbors.add(origin.clone()).await {
                    info!("neighbor added: {origin}");
                    let ok = self.greeting(Payload::HelloOk);
                    if let Err(e) = reply.write_all(ok.encode().as_bytes()).await {
                        debug!("failed to acknowledge {origin}: {e}");
                    }
                } else {
                    debug!("neighbor already known: {origin}");
                }
            }
            Payload::HelloOk => {
                debug!("{} acknowledged our greeting", frame.origin);
            }
            Payload::Bye => {
                self.engine.on_bye(&frame.origin).await;
            }
            Payload::Search { .. } => {
                self.engine.on_search(frame, Some(remote.ip())).await;
            }
            Payload::Val { .. } => {
                self.engine.on_val(frame).await;
            }
        }
    }
}

async fn accept_loop(node: Arc<Node>, listener: TcpListener) {
    let mut shutdown = node.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("listener stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    super::enable_keepalive(&stream);
                    debug!("accepted connection from {remote}");
                    tokio::spawn(handle_connection(node.clone(), stream, remote));
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
    }
}

/// Read frames off one inbound connection until EOF or error. Malformed
/// input never tears the connection down; the peer just loses that frame.
async fn handle_connection(node: Arc<Node>, stream: TcpStream, remote: SocketAddr) {
    let (rd, mut wr) = stream.into_split();
    let mut lines = BufReader::new(rd).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Frame::parse(&line) {
                    Ok(frame) => node.dispatch(frame, &mut wr, remote).await,
                    Err(e @ NetError::UnknownOp(_)) => debug!("from {remote}: {e}, dropped"),
                    Err(e) => warn!("from {remote}: {e}"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("connection from {remote} failed: {e}");
                break;
            }
        }
    }
    debug!("connection from {remote} closed");
}
