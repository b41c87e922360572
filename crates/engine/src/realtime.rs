use crate::resolver::{decode_documents, ReplyResolver};
use domain::{Error, Forest, Result, SortKey, Snapshot};
use std::sync::Arc;
use storage::{DocumentStore, Query, Subscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const LIVE_WINDOW: usize = 8;

#[derive(Debug, Clone)]
pub struct LiveForest {
    pub version: u64,
    pub forest: Forest,
}

/// A background task waits for each snapshot, resolves replies for every
/// comment in it and queues the rebuilt forest for the owner. Forests come
/// out in the order their snapshots arrived. After `teardown` nothing
/// further is handed out, including forests that were already queued.
pub struct RealtimeSync {
    rx: mpsc::Receiver<Result<LiveForest>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RealtimeSync {
    pub fn start(store: Arc<dyn DocumentStore>) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(16);
        let resolver = ReplyResolver::new(store.clone());
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut subscription =
                Subscription::new(store, Query::top_level(SortKey::Latest, None, LIVE_WINDOW));
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = subscription.next() => next,
                };
                let Some(snapshot) = next else {
                    info!("Change feed closed; live sync stops");
                    break;
                };

                let rebuilt = match snapshot {
                    Ok(snapshot) => tokio::select! {
                        _ = token.cancelled() => break,
                        rebuilt = rebuild(&resolver, snapshot) => rebuilt,
                    },
                    Err(e) => Err(Error::TransportFailure(e)),
                };

                if token.is_cancelled() || tx.send(rebuilt).await.is_err() {
                    break;
                }
            }
            debug!("Live sync task finished");
        });

        Self { rx, cancel, handle }
    }

    pub async fn recv(&mut self) -> Option<Result<LiveForest>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let item = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            item = self.rx.recv() => item,
        };
        if self.cancel.is_cancelled() {
            return None;
        }
        item
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    /// Stops the background task. Forests already queued are dropped.
    pub fn teardown(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!("Tearing down live sync");
        }
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Drop for RealtimeSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn rebuild(resolver: &ReplyResolver, snapshot: Snapshot) -> Result<LiveForest> {
    let roots = decode_documents(snapshot.documents)
        .into_iter()
        .map(|(_, node)| node)
        .collect();
    let forest = resolver.resolve_forest(roots).await?;
    Ok(LiveForest {
        version: snapshot.version,
        forest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seed;
    use std::time::Duration;
    use storage::MemoryStore;
    use tokio::time::timeout;

    async fn next(live: &mut RealtimeSync) -> LiveForest {
        timeout(Duration::from_secs(5), live.recv())
            .await
            .expect("live forest in time")
            .expect("feed open")
            .expect("rebuilt")
    }

    #[tokio::test]
    async fn delivers_initial_window_then_updates_with_replies() {
        let store = Arc::new(MemoryStore::new());
        let top = seed(&store, None, "first").await;
        let mut live = RealtimeSync::start(store.clone());

        let initial = next(&mut live).await;
        assert_eq!(initial.forest.len(), 1);

        seed(&store, Some(&top), "reply").await;
        let updated = next(&mut live).await;
        assert!(updated.version > initial.version);
        assert_eq!(updated.forest[0].children.len(), 1);
    }

    #[tokio::test]
    async fn window_holds_only_the_newest_comments() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..10 {
            seed(&store, None, &format!("c{}", i)).await;
        }
        let mut live = RealtimeSync::start(store.clone());
        let initial = next(&mut live).await;
        assert_eq!(initial.forest.len(), LIVE_WINDOW);
        for pair in initial.forest.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn nothing_is_handed_out_after_teardown() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, None, "x").await;
        let mut live = RealtimeSync::start(store.clone());
        next(&mut live).await;

        seed(&store, None, "y").await;
        // give the task time to queue the update
        tokio::time::sleep(Duration::from_millis(50)).await;
        live.teardown();
        assert!(live.recv().await.is_none());
        assert!(!live.is_active());
    }

    #[tokio::test]
    async fn snapshot_failures_surface_without_ending_the_feed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(1);
        let mut live = RealtimeSync::start(store.clone());

        let first = timeout(Duration::from_secs(5), live.recv()).await.unwrap().unwrap();
        assert!(matches!(first, Err(Error::TransportFailure(_))));
        let second = next(&mut live).await;
        assert!(second.forest.is_empty());
    }
}
