//! Outbound connection pool.
//!
//! One cached stream per peer, opened on the first send and reused by later
//! sends. A failed send evicts the entry; callers do not retry. Concurrent
//! senders serialize on the pool lock, so writes to a single peer never
//! interleave.

use super::message::Frame;
use super::types::{CONNECT_TIMEOUT_SECS, NetError, PeerAddr};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

pub struct ConnectionPool {
    streams: Mutex<HashMap<PeerAddr, TcpStream>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self { streams: Mutex::new(HashMap::new()) }
    }

    /// Send one frame to `peer`, opening and caching a stream if needed.
    pub async fn send(&self, peer: &PeerAddr, frame: &Frame) -> Result<(), NetError> {
        let line = frame.encode();
        let mut streams = self.streams.lock().await;

        if let Some(stream) = streams.get_mut(peer) {
            return match stream.write_all(line.as_bytes()).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    debug!("evicting stale connection to {peer}: {e}");
                    streams.remove(peer);
                    Err(e.into())
                }
            };
        }

        let mut stream = connect(peer).await?;
        stream.write_all(line.as_bytes()).await?;
        streams.insert(peer.clone(), stream);
        Ok(())
    }

    /// Drop the cached stream for a peer, if any.
    pub async fn evict(&self, peer: &PeerAddr) {
        if self.streams.lock().await.remove(peer).is_some() {
            debug!("evicted connection to {peer}");
        }
    }

    /// Close every pooled stream.
    pub async fn close_all(&self) {
        self.streams.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.streams.lock().await.len()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect(peer: &PeerAddr) -> Result<TcpStream, NetError> {
    let stream = timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        TcpStream::connect(peer.endpoint()),
    )
    .await
    .map_err(|_| {
        NetError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect to {peer} timed out"),
        ))
    })??;
    super::enable_keepalive(&stream);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::Payload;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn hello(seqno: u64) -> Frame {
        Frame::new(PeerAddr::new("127.0.0.1", 45900), seqno, 1, Payload::Hello)
    }

    #[tokio::test]
    async fn reuses_one_stream_per_peer() {
        let listener = TcpListener::bind("127.0.0.1:45910").await.unwrap();
        let peer = PeerAddr::new("127.0.0.1", 45910);
        let pool = ConnectionPool::new();

        pool.send(&peer, &hello(1)).await.unwrap();
        pool.send(&peer, &hello(2)).await.unwrap();
        assert_eq!(pool.len().await, 1);

        // Both frames must arrive on the single accepted connection.
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        assert_eq!(Frame::parse(&first).unwrap().seqno, 1);
        assert_eq!(Frame::parse(&second).unwrap().seqno, 2);
    }

    #[tokio::test]
    async fn refused_connection_is_an_error_and_nothing_is_cached() {
        let pool = ConnectionPool::new();
        let peer = PeerAddr::new("127.0.0.1", 45911);
        assert!(pool.send(&peer, &hello(1)).await.is_err());
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn evict_and_close_all_drop_entries() {
        let listener = TcpListener::bind("127.0.0.1:45912").await.unwrap();
        let peer = PeerAddr::new("127.0.0.1", 45912);
        let pool = ConnectionPool::new();
        pool.send(&peer, &hello(1)).await.unwrap();
        let _accepted = listener.accept().await.unwrap();

        pool.evict(&peer).await;
        assert_eq!(pool.len().await, 0);

        pool.send(&peer, &hello(2)).await.unwrap();
        pool.close_all().await;
        assert_eq!(pool.len().await, 0);
    }
}
