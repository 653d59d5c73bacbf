//! P2P overlay networking layer.

pub mod message;
pub mod neighbors;
pub mod node;
pub mod pool;
pub mod search;
pub mod types;

use tokio::net::TcpStream;
use tracing::debug;

// Re-exports
pub use message::{Frame, Payload, SearchMode};
pub use neighbors::NeighborTable;
pub use node::{Node, NodeConfig};
pub use pool::ConnectionPool;
pub use search::{Initiated, SearchEngine};
pub use types::{CONNECT_TIMEOUT_SECS, DEFAULT_TTL, GREETING_TTL, NetError, PeerAddr, SearchId};

/// Enable TCP keep-alive on a socket; failures are logged and ignored.
pub(crate) fn enable_keepalive(stream: &TcpStream) {
    if let Err(e) = socket2::SockRef::from(stream).set_keepalive(true) {
        debug!("failed to enable keep-alive: {e}");
    }
}
