use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::protocol::Document;
use domain::{Address, ChangeNotice, PageCursor, Reactions, SortKey};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const ID_LEN: usize = 20;
const FEED_CAPACITY: usize = 100;

/// Ordering is always `(sort value desc, id asc)`; every write bumps the
/// store-wide data version and broadcasts a [`ChangeNotice`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(&self, query: &Query) -> anyhow::Result<Vec<Document>>;

    async fn get(&self, address: &Address) -> anyhow::Result<Option<Document>>;

    /// Creates a document under `parent` (the top-level collection when
    /// `None`), assigning its id and timestamp. `None` if the parent is gone.
    async fn create(
        &self,
        parent: Option<&Address>,
        data: Value,
    ) -> anyhow::Result<Option<Document>>;

    async fn set_reactions(&self, address: &Address, reactions: &Reactions)
        -> anyhow::Result<bool>;

    async fn increment_reaction(
        &self,
        address: &Address,
        emoji: &str,
    ) -> anyhow::Result<Option<Reactions>>;

    fn version(&self) -> u64;

    fn changes(&self) -> broadcast::Receiver<ChangeNotice>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub parent: Option<Address>,
    pub order: SortKey,
    pub after: Option<PageCursor>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn top_level(order: SortKey, after: Option<PageCursor>, limit: usize) -> Self {
        Self {
            parent: None,
            order,
            after,
            limit: Some(limit),
        }
    }

    pub fn replies_of(parent: Address) -> Self {
        Self {
            parent: Some(parent),
            order: SortKey::Latest,
            after: None,
            limit: None,
        }
    }

    pub fn collection_path(&self) -> String {
        match &self.parent {
            None => Address::COLLECTION.to_string(),
            Some(parent) => parent.replies_path(),
        }
    }
}

pub(crate) fn collection_of(address: &Address) -> String {
    match address.parent() {
        None => Address::COLLECTION.to_string(),
        Some(parent) => parent.replies_path(),
    }
}

pub(crate) fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Default)]
pub(crate) struct Clock {
    last_micros: Mutex<i64>,
}

impl Clock {
    pub(crate) fn starting_after(micros: i64) -> Self {
        Self {
            last_micros: Mutex::new(micros),
        }
    }

    pub(crate) fn next(&self) -> DateTime<Utc> {
        let mut last = self
            .last_micros
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Utc::now().timestamp_micros();
        *last = now.max(*last + 1);
        DateTime::from_timestamp_micros(*last).unwrap_or_else(Utc::now)
    }
}

#[derive(Clone)]
pub(crate) struct Feed {
    version: Arc<AtomicU64>,
    tx: broadcast::Sender<ChangeNotice>,
}

impl Feed {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = broadcast::channel(FEED_CAPACITY);
        Self {
            version: Arc::new(AtomicU64::new(0)),
            tx,
        }
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, address: Address) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        // no listeners is fine
        let _ = self.tx.send(ChangeNotice { version, address });
    }
}
