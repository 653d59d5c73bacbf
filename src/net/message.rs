//! Line-oriented wire codec.
//!
//! Every frame is one newline-terminated ASCII record of whitespace-separated
//! fields: `ORIGIN SEQNO TTL OP` plus operation-specific trailing fields.
//! Several frames may arrive in one TCP read; the connection handler splits
//! them on newlines before they reach [`Frame::parse`].

use super::types::{NetError, PeerAddr, SearchId};
use std::fmt;
use std::str::FromStr;

/// Search strategy tag carried in SEARCH and VAL frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    /// Forward to every neighbor except the sender.
    Flooding,
    /// Forward to one random neighbor.
    RandomWalk,
    /// Forward to one random untried neighbor, backtracking when stuck.
    DepthFirst,
}

impl SearchMode {
    pub const ALL: [SearchMode; 3] = [
        SearchMode::Flooding,
        SearchMode::RandomWalk,
        SearchMode::DepthFirst,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            SearchMode::Flooding => "FL",
            SearchMode::RandomWalk => "RW",
            SearchMode::DepthFirst => "BP",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SearchMode {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FL" => Ok(SearchMode::Flooding),
            "RW" => Ok(SearchMode::RandomWalk),
            "BP" => Ok(SearchMode::DepthFirst),
            other => Err(NetError::MalformedFrame(format!("unknown mode `{other}`"))),
        }
    }
}

/// Operation-specific payload of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Ask the receiver to record the sender as a neighbor.
    Hello,
    /// Acknowledge a `Hello`.
    HelloOk,
    /// Announce departure; the receiver forgets the sender.
    Bye,
    /// Forwarded lookup.
    Search {
        mode: SearchMode,
        /// Port of the immediately previous forwarder, so relays avoid
        /// bouncing the search straight back.
        last_hop_port: u16,
        key: String,
        hop_count: u32,
    },
    /// Search result, delivered straight to the originator.
    Val {
        mode: SearchMode,
        key: String,
        value: String,
        hop_count: u32,
    },
}

impl Payload {
    pub fn op(&self) -> &'static str {
        match self {
            Payload::Hello => "HELLO",
            Payload::HelloOk => "HELLO_OK",
            Payload::Bye => "BYE",
            Payload::Search { .. } => "SEARCH",
            Payload::Val { .. } => "VAL",
        }
    }
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub origin: PeerAddr,
    pub seqno: u64,
    pub ttl: u32,
    pub payload: Payload,
}

impl Frame {
    pub fn new(origin: PeerAddr, seqno: u64, ttl: u32, payload: Payload) -> Self {
        Self { origin, seqno, ttl, payload }
    }

    pub fn search_id(&self) -> SearchId {
        SearchId { origin: self.origin.clone(), seqno: self.seqno }
    }

    /// Parse one line, with or without its trailing newline.
    pub fn parse(line: &str) -> Result<Frame, NetError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(NetError::MalformedFrame(format!(
                "expected at least 4 fields, got {}",
                fields.len()
            )));
        }

        let origin: PeerAddr = fields[0].parse()?;
        let seqno = parse_u64(fields[1], "seqno")?;
        let ttl = parse_u32(fields[2], "ttl")?;

        let payload = match (fields[3], &fields[4..]) {
            ("HELLO", []) => Payload::Hello,
            ("HELLO_OK", []) => Payload::HelloOk,
            ("BYE", []) => Payload::Bye,
            ("SEARCH", [mode, last_hop, key, hops]) => Payload::Search {
                mode: mode.parse()?,
                last_hop_port: parse_u16(last_hop, "last hop port")?,
                key: (*key).to_string(),
                hop_count: parse_u32(hops, "hop count")?,
            },
            ("VAL", [mode, key, value, hops]) => Payload::Val {
                mode: mode.parse()?,
                key: (*key).to_string(),
                value: (*value).to_string(),
                hop_count: parse_u32(hops, "hop count")?,
            },
            ("HELLO" | "HELLO_OK" | "BYE" | "SEARCH" | "VAL", rest) => {
                return Err(NetError::MalformedFrame(format!(
                    "wrong field count for {}: {} trailing fields",
                    fields[3],
                    rest.len()
                )));
            }
            (op, _) => return Err(NetError::UnknownOp(op.to_string())),
        };

        Ok(Frame { origin, seqno, ttl, payload })
    }

    /// Render as one newline-terminated line.
    pub fn encode(&self) -> String {
        let head = format!("{} {} {}", self.origin, self.seqno, self.ttl);
        match &self.payload {
            Payload::Hello => format!("{head} HELLO\n"),
            Payload::HelloOk => format!("{head} HELLO_OK\n"),
            Payload::Bye => format!("{head} BYE\n"),
            Payload::Search { mode, last_hop_port, key, hop_count } => {
                format!("{head} SEARCH {mode} {last_hop_port} {key} {hop_count}\n")
            }
            Payload::Val { mode, key, value, hop_count } => {
                format!("{head} VAL {mode} {key} {value} {hop_count}\n")
            }
        }
    }
}

fn parse_u64(field: &str, what: &str) -> Result<u64, NetError> {
    field
        .parse()
        .map_err(|_| NetError::MalformedFrame(format!("bad {what} `{field}`")))
}

fn parse_u32(field: &str, what: &str) -> Result<u32, NetError> {
    field
        .parse()
        .map_err(|_| NetError::MalformedFrame(format!("bad {what} `{field}`")))
}

fn parse_u16(field: &str, what: &str) -> Result<u16, NetError> {
    field
        .parse()
        .map_err(|_| NetError::MalformedFrame(format!("bad {what} `{field}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn origin() -> PeerAddr {
        PeerAddr::new("127.0.0.1", 5000)
    }

    #[test]
    fn parses_greetings() {
        let frame = Frame::parse("127.0.0.1:5000 3 1 HELLO\n").unwrap();
        assert_eq!(frame.origin, origin());
        assert_eq!(frame.seqno, 3);
        assert_eq!(frame.ttl, 1);
        assert_eq!(frame.payload, Payload::Hello);

        assert_eq!(
            Frame::parse("127.0.0.1:5000 4 1 HELLO_OK").unwrap().payload,
            Payload::HelloOk
        );
        assert_eq!(
            Frame::parse("127.0.0.1:5000 5 1 BYE").unwrap().payload,
            Payload::Bye
        );
    }

    #[test]
    fn parses_search() {
        let frame = Frame::parse("127.0.0.1:5000 7 9 SEARCH FL 5001 KEY1 2").unwrap();
        assert_eq!(
            frame.payload,
            Payload::Search {
                mode: SearchMode::Flooding,
                last_hop_port: 5001,
                key: "KEY1".to_string(),
                hop_count: 2,
            }
        );
    }

    #[test]
    fn parses_val() {
        let frame = Frame::parse("127.0.0.1:5002 7 8 VAL BP KEY1 V1 4").unwrap();
        assert_eq!(
            frame.payload,
            Payload::Val {
                mode: SearchMode::DepthFirst,
                key: "KEY1".to_string(),
                value: "V1".to_string(),
                hop_count: 4,
            }
        );
    }

    #[test]
    fn rejects_short_frames() {
        assert!(matches!(
            Frame::parse("127.0.0.1:5000 1 10"),
            Err(NetError::MalformedFrame(_))
        ));
        assert!(matches!(Frame::parse(""), Err(NetError::MalformedFrame(_))));
    }

    #[test]
    fn rejects_non_integer_fields() {
        assert!(Frame::parse("127.0.0.1:5000 x 10 HELLO").is_err());
        assert!(Frame::parse("127.0.0.1:5000 1 ten HELLO").is_err());
        assert!(Frame::parse("127.0.0.1:5000 1 10 SEARCH FL nope KEY1 0").is_err());
        assert!(Frame::parse("127.0.0.1:5000 1 10 SEARCH FL 5001 KEY1 -1").is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(Frame::parse("127.0.0.1:5000 1 10 HELLO extra").is_err());
        assert!(Frame::parse("127.0.0.1:5000 1 10 SEARCH FL 5001 KEY1").is_err());
        assert!(Frame::parse("127.0.0.1:5000 1 10 VAL FL KEY1 V1 2 extra").is_err());
    }

    #[test]
    fn unknown_op_is_its_own_error() {
        match Frame::parse("127.0.0.1:5000 1 10 PING") {
            Err(NetError::UnknownOp(op)) => assert_eq!(op, "PING"),
            other => panic!("expected UnknownOp, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Frame::parse("127.0.0.1:5000 1 10 SEARCH XX 5001 KEY1 0").is_err());
    }

    proptest! {
        #[test]
        fn parse_never_panics(line in "\\PC*") {
            let _ = Frame::parse(&line);
        }

        #[test]
        fn search_frames_roundtrip(
            host in "[a-z][a-z0-9.-]{0,15}",
            port in any::<u16>(),
            seqno in any::<u64>(),
            ttl in any::<u32>(),
            last_hop_port in any::<u16>(),
            key in "[A-Za-z0-9_]{1,12}",
            hop_count in any::<u32>(),
        ) {
            let frame = Frame::new(
                PeerAddr::new(host, port),
                seqno,
                ttl,
                Payload::Search {
                    mode: SearchMode::RandomWalk,
                    last_hop_port,
                    key,
                    hop_count,
                },
            );
            let parsed = Frame::parse(&frame.encode()).expect("encoded frame should parse");
            prop_assert_eq!(frame, parsed);
        }
    }
}
