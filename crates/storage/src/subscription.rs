use crate::store::{DocumentStore, Query};
use domain::{ChangeNotice, Snapshot};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Live view of one query: an initial snapshot, then a fresh full snapshot
/// after every change, each with a strictly greater data version.
pub struct Subscription {
    store: Arc<dyn DocumentStore>,
    query: Query,
    changes: broadcast::Receiver<ChangeNotice>,
    delivered: Option<u64>,
    stale: bool,
}

impl Subscription {
    pub fn new(store: Arc<dyn DocumentStore>, query: Query) -> Self {
        // subscribe before the first read so no write can fall in between
        let changes = store.changes();
        Self {
            store,
            query,
            changes,
            delivered: None,
            stale: true,
        }
    }

    /// A failed read is returned as an error and retried on the next call
    /// without waiting for another change.
    pub async fn next(&mut self) -> Option<anyhow::Result<Snapshot>> {
        loop {
            if !self.stale {
                let last = self.delivered.unwrap_or(0);
                loop {
                    match self.changes.recv().await {
                        Ok(notice) if notice.version > last => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Subscription lagged by {} change notices", skipped);
                            break;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }

            let version = self.store.version();
            if self.delivered.is_some_and(|last| version <= last) {
                // already delivered this data version
                self.stale = false;
                continue;
            }

            return match self.store.query(&self.query).await {
                Ok(documents) => {
                    debug!(
                        "Snapshot v{} for {} ({} documents)",
                        version,
                        self.query.collection_path(),
                        documents.len()
                    );
                    self.delivered = Some(version);
                    self.stale = false;
                    Some(Ok(Snapshot { version, documents }))
                }
                Err(e) => {
                    self.stale = true;
                    Some(Err(e))
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use domain::protocol::build_node_document;
    use domain::{Author, SortKey};
    use std::time::Duration;

    fn doc() -> serde_json::Value {
        build_node_document(&Author::default(), "x", &[])
    }

    #[tokio::test]
    async fn delivers_initial_then_one_snapshot_per_change() {
        let store = Arc::new(MemoryStore::new());
        store.create(None, doc()).await.unwrap();

        let mut sub = Subscription::new(store.clone(), Query::top_level(SortKey::Latest, None, 8));
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.documents.len(), 1);

        store.create(None, doc()).await.unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.documents.len(), 2);
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn waits_while_nothing_changes() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = Subscription::new(store.clone(), Query::top_level(SortKey::Latest, None, 8));
        sub.next().await.unwrap().unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn failed_read_is_retried_immediately() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = Subscription::new(store.clone(), Query::top_level(SortKey::Latest, None, 8));
        store.fail_next(1);
        assert!(sub.next().await.unwrap().is_err());
        assert!(sub.next().await.unwrap().is_ok());
    }
}
