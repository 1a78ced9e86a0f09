//! Network link capability.
//!
//! Association and reconnection are somebody else's job; the updater only
//! asks whether the link is up and, if not, waits a bounded time for it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Whether the device can currently reach the host.
#[async_trait]
pub trait NetworkLink: Send + Sync {
    /// Current link state, without waiting.
    async fn is_connected(&self) -> bool;

    /// Block until connected or until `timeout` elapses.
    async fn ensure_connected(&self, timeout: Duration) -> bool;
}

#[async_trait]
impl<T: NetworkLink + ?Sized> NetworkLink for std::sync::Arc<T> {
    async fn is_connected(&self) -> bool {
        (**self).is_connected().await
    }

    async fn ensure_connected(&self, timeout: Duration) -> bool {
        (**self).ensure_connected(timeout).await
    }
}

/// For hosts whose network is managed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConnected;

#[async_trait]
impl NetworkLink for AlwaysConnected {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn ensure_connected(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Treats the link as up when a TCP connection to `addr` succeeds.
#[derive(Debug, Clone)]
pub struct TcpLink {
    addr: String,
    attempt_timeout: Duration,
    retry_interval: Duration,
}

impl TcpLink {
    /// Connect to `addr` (`host:port`) to test the link.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            attempt_timeout: Duration::from_secs(2),
            retry_interval: Duration::from_millis(500),
        }
    }

    /// The address connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn attempt(&self, budget: Duration) -> bool {
        let limit = budget.min(self.attempt_timeout);
        match tokio::time::timeout(limit, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, "link check failed: {e}");
                false
            }
            Err(_) => {
                tracing::debug!(addr = %self.addr, "link check timed out");
                false
            }
        }
    }
}

#[async_trait]
impl NetworkLink for TcpLink {
    async fn is_connected(&self) -> bool {
        self.attempt(self.attempt_timeout).await
    }

    async fn ensure_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if self.attempt(remaining).await {
                return true;
            }
            let pause = self
                .retry_interval
                .min(deadline.saturating_duration_since(tokio::time::Instant::now()));
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_link_sees_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let link = TcpLink::new(listener.local_addr().unwrap().to_string());
        assert!(link.is_connected().await);
        assert!(link.ensure_connected(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn tcp_link_gives_up_after_timeout() {
        // bind then drop so the port is very likely closed
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let link = TcpLink::new(addr);
        let started = std::time::Instant::now();
        assert!(!link.ensure_connected(Duration::from_millis(300)).await);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
