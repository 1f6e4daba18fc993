use std::ops::Deref;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, Mutex};

/// Fixed-size pool of HTTPS clients for DoH exchanges. `acquire` waits
/// until a client is free, so at most `size` upstream HTTP requests are
/// in flight at once.
pub struct ClientPool {
    tx: mpsc::Sender<reqwest::Client>,
    rx: Mutex<mpsc::Receiver<reqwest::Client>>,
}

impl ClientPool {
    pub fn new(size: usize, timeout: Duration) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel(size.max(1));
        for _ in 0..size.max(1) {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("failed to build an HTTPS client")?;
            tx.try_send(client).expect("channel was sized to fit the pool");
        }
        Ok(ClientPool {
            tx,
            rx: Mutex::new(rx),
        })
    }

    pub async fn acquire(&self) -> anyhow::Result<PooledClient<'_>> {
        let client = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .context("the client pool channel is closed")?;
        Ok(PooledClient { client: Some(client), pool: self })
    }
}

/// A client checked out of the pool. Returned on drop.
pub struct PooledClient<'a> {
    client: Option<reqwest::Client>,
    pool: &'a ClientPool,
}

impl Deref for PooledClient<'_> {
    type Target = reqwest::Client;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref().expect("present until dropped")
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            // can't fail: the channel holds exactly as many slots as clients
            let _ = self.pool.tx.try_send(client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clients_cycle_through_the_pool() {
        let pool = ClientPool::new(2, Duration::from_secs(5)).unwrap();

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        drop(first);
        drop(second);

        // both clients are back, two more acquires succeed immediately
        let _a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_a_returned_client() {
        let pool = ClientPool::new(1, Duration::from_secs(5)).unwrap();
        let held = pool.acquire().await.unwrap();

        let pending = pool.acquire();
        tokio::pin!(pending);
        assert!(futures_ready(&mut pending).await.is_none());

        drop(held);
        assert!(futures_ready(&mut pending).await.is_some());
    }

    async fn futures_ready<F: std::future::Future + Unpin>(f: &mut F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = f => Some(out),
            _ = tokio::task::yield_now() => None,
        }
    }
}
