use crate::collaborators::IdentityProvider;
use crate::tree::TreeStore;
use domain::protocol::read_reactions;
use domain::{Address, Error, Reactions, Result};
use serde::Deserialize;
use std::sync::Arc;
use storage::DocumentStore;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionStrategy {
    /// Read the map, add one locally, write the whole map back. Two
    /// concurrent reactions may collapse into one.
    #[default]
    ReadModifyWrite,
    /// Let the store add one in a single step. Never loses an increment.
    Atomic,
}

pub struct ReactionAggregator {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    strategy: ReactionStrategy,
}

impl ReactionAggregator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        strategy: ReactionStrategy,
    ) -> Self {
        Self {
            store,
            identity,
            strategy,
        }
    }

    pub async fn react(&self, tree: &mut TreeStore, address: &Address, emoji: &str) -> Result<Reactions> {
        let user = self.identity.current_user().ok_or(Error::Unauthenticated)?;
        if address.ids().any(|id| id.is_local()) {
            return Err(Error::NotFound(address.to_string()));
        }

        let persisted = match self.strategy {
            ReactionStrategy::ReadModifyWrite => {
                let doc = self
                    .store
                    .get(address)
                    .await?
                    .ok_or_else(|| Error::NotFound(address.to_string()))?;
                let mut reactions = read_reactions(&doc.data);
                reactions.increment(emoji);
                if !self.store.set_reactions(address, &reactions).await? {
                    return Err(Error::NotFound(address.to_string()));
                }
                reactions
            }
            ReactionStrategy::Atomic => self
                .store
                .increment_reaction(address, emoji)
                .await?
                .ok_or_else(|| Error::NotFound(address.to_string()))?,
        };

        info!("{} reacted {} on {} (now {})", user.uid, emoji, address, persisted.get(emoji));
        tree.apply_reaction_delta(address, emoji);
        Ok(persisted)
    }
}
