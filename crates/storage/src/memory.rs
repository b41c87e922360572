use crate::store::{Clock, DocumentStore, Feed, Query};
use anyhow::anyhow;
use async_trait::async_trait;
use domain::protocol::{read_reactions, sort_value, write_reactions, write_timestamp, Document};
use domain::{Address, ChangeNotice, NodeId, Reactions};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    feed: Feed,
    clock: Arc<Clock>,
    yielding: bool,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<Address, Value>,
    fail_next: usize,
    calls: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            feed: Feed::new(),
            clock: Arc::new(Clock::default()),
            yielding: false,
        }
    }

    /// Every call gives up the thread once before touching data, so that
    /// concurrent callers interleave the way remote round trips do.
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    /// Makes the next `n` calls fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    pub fn insert_raw(&self, address: Address, data: Value) {
        self.lock().docs.insert(address.clone(), data);
        self.feed.publish(address);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        if self.yielding {
            tokio::task::yield_now().await;
        }
        let mut inner = self.lock();
        inner.calls += 1;
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(anyhow!("injected transport failure"));
        }
        Ok(inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, query: &Query) -> anyhow::Result<Vec<Document>> {
        let inner = self.enter().await?;
        let mut rows: Vec<(i64, &Address, &Value)> = inner
            .docs
            .iter()
            .filter(|(address, _)| address.parent() == query.parent)
            .map(|(address, data)| (sort_value(query.order, data), address, data))
            .filter(|(key, address, _)| {
                query
                    .after
                    .as_ref()
                    .map_or(true, |cursor| cursor.admits(*key, address.target()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.target().cmp(b.1.target())));

        Ok(rows
            .into_iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, address, data)| Document {
                address: address.clone(),
                data: data.clone(),
            })
            .collect())
    }

    async fn get(&self, address: &Address) -> anyhow::Result<Option<Document>> {
        let inner = self.enter().await?;
        Ok(inner.docs.get(address).map(|data| Document {
            address: address.clone(),
            data: data.clone(),
        }))
    }

    async fn create(
        &self,
        parent: Option<&Address>,
        mut data: Value,
    ) -> anyhow::Result<Option<Document>> {
        let address = {
            let mut inner = self.enter().await?;
            if let Some(parent) = parent {
                if !inner.docs.contains_key(parent) {
                    return Ok(None);
                }
            }
            let id = NodeId::new_unchecked(crate::store::generate_id());
            let address = match parent {
                Some(parent) => parent.child(id),
                None => Address::top_level(id),
            };
            write_timestamp(&mut data, self.clock.next());
            inner.docs.insert(address.clone(), data.clone());
            address
        };
        self.feed.publish(address.clone());
        Ok(Some(Document { address, data }))
    }

    async fn set_reactions(
        &self,
        address: &Address,
        reactions: &Reactions,
    ) -> anyhow::Result<bool> {
        {
            let mut inner = self.enter().await?;
            match inner.docs.get_mut(address) {
                Some(data) => write_reactions(data, reactions),
                None => return Ok(false),
            }
        }
        self.feed.publish(address.clone());
        Ok(true)
    }

    async fn increment_reaction(
        &self,
        address: &Address,
        emoji: &str,
    ) -> anyhow::Result<Option<Reactions>> {
        let reactions = {
            let mut inner = self.enter().await?;
            let Some(data) = inner.docs.get_mut(address) else {
                return Ok(None);
            };
            let mut reactions = read_reactions(data);
            reactions.increment(emoji);
            write_reactions(data, &reactions);
            reactions
        };
        self.feed.publish(address.clone());
        Ok(Some(reactions))
    }

    fn version(&self) -> u64 {
        self.feed.version()
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.feed.subscribe()
    }
}
