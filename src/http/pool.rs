//! `ConnectionPool` (§3, §4.5): pool key `(scheme, host, port, tls, sni)` →
//! bounded LIFO of idle sockets, each with an idle deadline. A socket is
//! exclusively owned by whichever request checks it out; it is returned on
//! clean completion or dropped (closing it) otherwise. Mirrors the shared
//! `Arc<RwLock<...>>` bookkeeping style used for other shared registries,
//! scoped here to pooled sockets rather than a plugin registry.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

pub type PoolKey = (String, String, u16, bool, String);

/// Either a plain `TcpStream` or a TLS-wrapped one, pooled behind one trait
/// object so the pool doesn't need to know which.
pub trait PooledStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> PooledStream for T {}

struct IdleConn {
    stream: Box<dyn PooledStream>,
    deadline: Instant,
}

pub struct ConnectionPool {
    idle: Mutex<HashMap<PoolKey, Vec<IdleConn>>>,
    max_idle_per_key: usize,
    idle_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(max_idle_per_key: usize, idle_timeout: Duration) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            max_idle_per_key,
            idle_timeout,
        }
    }

    /// Pops the most recently returned live socket for `key`, discarding any
    /// that have outlived their idle deadline along the way.
    pub async fn checkout(&self, key: &PoolKey) -> Option<Box<dyn PooledStream>> {
        let mut idle = self.idle.lock().await;
        let list = idle.get_mut(key)?;
        while let Some(conn) = list.pop() {
            if conn.deadline > Instant::now() {
                return Some(conn.stream);
            }
        }
        None
    }

    /// Returns a socket to the pool for `key`, unless the per-key bound is
    /// already full (in which case it is dropped, which closes it).
    pub async fn checkin(&self, key: PoolKey, stream: Box<dyn PooledStream>) {
        let mut idle = self.idle.lock().await;
        let list = idle.entry(key).or_default();
        if list.len() < self.max_idle_per_key {
            list.push(IdleConn {
                stream,
                deadline: Instant::now() + self.idle_timeout,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    fn key(host: &str, port: u16) -> PoolKey {
        ("https".to_string(), host.to_string(), port, true, host.to_string())
    }

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        (accepted.unwrap().0, connected.unwrap())
    }

    #[tokio::test]
    async fn checkin_then_checkout_returns_the_same_key_only() {
        let pool = ConnectionPool::new(4, Duration::from_secs(30));
        let (a, _keep_a) = pair().await;
        pool.checkin(key("en.wikipedia.org", 443), Box::new(a)).await;

        assert!(pool.checkout(&key("commons.wikimedia.org", 443)).await.is_none());
        assert!(pool.checkout(&key("en.wikipedia.org", 443)).await.is_some());
        assert!(pool.checkout(&key("en.wikipedia.org", 443)).await.is_none());
    }

    #[tokio::test]
    async fn expired_idle_connections_are_not_returned() {
        let pool = ConnectionPool::new(4, Duration::from_millis(1));
        let (a, _keep_a) = pair().await;
        pool.checkin(key("en.wikipedia.org", 443), Box::new(a)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pool.checkout(&key("en.wikipedia.org", 443)).await.is_none());
    }

    #[tokio::test]
    async fn over_capacity_checkins_are_dropped() {
        let pool = ConnectionPool::new(1, Duration::from_secs(30));
        let (a, _keep_a) = pair().await;
        let (b, _keep_b) = pair().await;
        let k = key("en.wikipedia.org", 443);
        pool.checkin(k.clone(), Box::new(a)).await;
        pool.checkin(k.clone(), Box::new(b)).await;
        assert!(pool.checkout(&k).await.is_some());
        assert!(pool.checkout(&k).await.is_none());
    }
}
