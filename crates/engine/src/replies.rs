use crate::collaborators::IdentityProvider;
use crate::composer::ensure_within_limit;
use crate::tree::TreeStore;
use anyhow::anyhow;
use domain::protocol::{build_node_document, decode_node};
use domain::{Address, Author, CommentNode, Error, NodeId, Reactions, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use storage::DocumentStore;
use tracing::{error, info};

pub struct ReplyMutator {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    staged: AtomicU64,
}

impl ReplyMutator {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            staged: AtomicU64::new(0),
        }
    }

    /// While the write is in flight the tree holds a pending copy under a
    /// local id. On failure the pending copy is removed again.
    pub async fn add_reply(
        &self,
        tree: &mut TreeStore,
        address: &Address,
        content_html: &str,
    ) -> Result<CommentNode> {
        let user = self.identity.current_user().ok_or(Error::Unauthenticated)?;
        ensure_within_limit(content_html)?;
        if address.ids().any(NodeId::is_local) {
            // the parent itself has not been confirmed yet
            return Err(Error::NotFound(address.to_string()));
        }

        let author = Author::from(&user);
        let staged_id = NodeId::local(self.staged.fetch_add(1, Ordering::Relaxed) + 1);
        tree.append_reply(
            address,
            CommentNode {
                id: staged_id.clone(),
                author: author.clone(),
                body_html: content_html.to_string(),
                attachments: Vec::new(),
                reactions: Reactions::new(),
                created_at: None,
                children: Vec::new(),
            },
        );

        let data = build_node_document(&author, content_html, &[]);
        let created = match self.store.create(Some(address), data).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                tree.discard(&staged_id);
                return Err(Error::NotFound(address.to_string()));
            }
            Err(e) => {
                error!("Failed to store reply under {}: {:?}", address, e);
                tree.discard(&staged_id);
                return Err(Error::TransportFailure(e));
            }
        };

        let node = match decode_node(&created) {
            Ok(node) => node,
            Err(e) => {
                tree.discard(&staged_id);
                return Err(Error::TransportFailure(anyhow!("store returned {}", e)));
            }
        };
        tree.confirm_staged(&staged_id, node.clone());
        info!("{} replied at {}", user.uid, created.address);
        Ok(node)
    }
}
