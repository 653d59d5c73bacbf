//! Overlay constants and core types.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default hop budget for searches originated here.
/// Operators can change it at runtime from the menu.
pub const DEFAULT_TTL: u32 = 100;

/// Seconds to wait for an outbound connect before giving up.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// TTL stamped on greeting frames (HELLO, HELLO_OK, BYE).
/// Greetings never travel more than one hop.
pub const GREETING_TTL: u32 = 1;

/// Peer address as rendered on the wire: `host:port`.
///
/// Host may be a hostname or an IP literal. Equality is over both fields,
/// so the same daemon reached under two names counts as two peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Endpoint string accepted by `TcpStream::connect`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddr {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Split on the last colon so IPv6-ish hosts keep their inner colons.
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| NetError::BadAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(NetError::BadAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| NetError::BadAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Globally unique search identifier: originator plus its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchId {
    pub origin: PeerAddr,
    pub seqno: u64,
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.seqno)
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown operation `{0}`")]
    UnknownOp(String),

    #[error("bad peer address `{0}`")]
    BadAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let addr: PeerAddr = "10.0.0.7:5001".parse().unwrap();
        assert_eq!(addr.host, "10.0.0.7");
        assert_eq!(addr.port, 5001);
        assert_eq!(addr.to_string(), "10.0.0.7:5001");
    }

    #[test]
    fn parses_hostname() {
        let addr: PeerAddr = "node-a.local:9000".parse().unwrap();
        assert_eq!(addr.host, "node-a.local");
        assert_eq!(addr.port, 9000);
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!("5001".parse::<PeerAddr>().is_err());
        assert!(":5001".parse::<PeerAddr>().is_err());
        assert!("host:".parse::<PeerAddr>().is_err());
        assert!("host:notaport".parse::<PeerAddr>().is_err());
        assert!("host:99999".parse::<PeerAddr>().is_err());
    }

    #[test]
    fn equality_is_over_both_fields() {
        let a = PeerAddr::new("127.0.0.1", 5000);
        let b = PeerAddr::new("localhost", 5000);
        let c = PeerAddr::new("127.0.0.1", 5001);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, PeerAddr::new("127.0.0.1", 5000));
    }
}
