//! Sonar: unstructured peer-to-peer key-value search overlay.
//!
//! A node holds a small local key→value map, knows a set of neighbors by
//! address, and answers lookups it cannot satisfy locally by forwarding
//! over the overlay: flooding, random walk, or depth-first search with
//! backtracking. Duplicate suppression by (origin, sequence number) and a
//! per-frame TTL keep the traffic finite.

pub mod config;
pub mod net;
pub mod stats;
pub mod store;

pub use config::{ConfigError, load_keys, load_neighbors};
pub use net::{
    ConnectionPool, DEFAULT_TTL, Frame, Initiated, NeighborTable, NetError, Node, NodeConfig,
    Payload, PeerAddr, SearchEngine, SearchId, SearchMode,
};
pub use stats::{ModeStats, SearchStats};
pub use store::LocalStore;
