use std::sync::Arc;
use std::time::Duration;

use hashlink::LinkedHashMap;
use splitdns_lib::Message;
use tokio::sync::RwLock;

/// LRU cache of complete upstream responses, keyed by normalized query
/// name. Entries carry the upstream's header and ID; callers re-stamp a
/// cached message before sending it to a client.
pub struct ResponseCache {
    entries: RwLock<LinkedHashMap<String, Message>>,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        ResponseCache {
            entries: RwLock::new(LinkedHashMap::with_capacity(capacity)),
            capacity,
        }
    }

    /// Looks up a response and marks it most recently used.
    pub async fn get(&self, qname: &str) -> Option<Message> {
        // to_back needs the write lock to reorder the entry
        self.entries.write().await.to_back(qname).cloned()
    }

    /// Stores a response, evicting the least recently used entry when the
    /// cache is full. Returns whether the entry was admitted: a
    /// zero-capacity cache refuses everything.
    pub async fn put(&self, qname: String, response: Message) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity && !entries.contains_key(&qname) {
            entries.pop_front();
        }
        // insert puts the entry at the back, i.e. most recently used
        entries.insert(qname, response);
        true
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Spawns a task that drops the whole cache every `every`. Crude but
    /// bounds staleness without tracking per-record TTLs.
    pub fn spawn_flush_task(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // the first tick fires immediately; nothing to flush yet
            interval.tick().await;
            loop {
                interval.tick().await;
                let flushed = {
                    let mut entries = cache.entries.write().await;
                    let flushed = entries.len();
                    entries.clear();
                    flushed
                };
                if flushed > 0 {
                    tracing::debug!(entries = flushed, "flushed the response cache");
                }
            }
        })
    }
}
