use domain::protocol::{decode_node, Document};
use domain::{Address, CommentNode, Forest, Result};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use storage::{DocumentStore, Query};
use tracing::{debug, warn};

pub(crate) fn decode_documents(documents: Vec<Document>) -> Vec<(Address, CommentNode)> {
    documents
        .into_iter()
        .filter_map(|doc| match decode_node(&doc) {
            Ok(node) => Some((doc.address, node)),
            Err(e) => {
                warn!("Skipping malformed document: {}", e);
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct ReplyResolver {
    store: Arc<dyn DocumentStore>,
}

impl ReplyResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// All subcollections of one level are fetched concurrently; a failure
    /// anywhere fails the whole call and nothing partial is returned.
    pub async fn resolve(&self, address: &Address) -> Result<Vec<CommentNode>> {
        let mut level = vec![address.clone()];
        let mut visited: Vec<Address> = Vec::new();
        let mut fetched: HashMap<Address, Vec<(Address, CommentNode)>> = HashMap::new();
        let mut rounds = 0;

        while !level.is_empty() {
            rounds += 1;
            let results = try_join_all(level.iter().map(|parent| self.children_of(parent))).await?;
            let mut next = Vec::new();
            for (parent, children) in level.into_iter().zip(results) {
                next.extend(children.iter().map(|(child, _)| child.clone()));
                visited.push(parent.clone());
                fetched.insert(parent, children);
            }
            level = next;
        }

        // deepest parents come last in visiting order, so walking it
        // backwards completes every child before its parent
        let mut assembled: HashMap<Address, Vec<CommentNode>> = HashMap::new();
        for parent in visited.iter().rev() {
            let children = fetched.remove(parent).unwrap_or_default();
            let nodes = children
                .into_iter()
                .map(|(child, mut node)| {
                    node.children = assembled.remove(&child).unwrap_or_default();
                    node
                })
                .collect();
            assembled.insert(parent.clone(), nodes);
        }

        let replies = assembled.remove(address).unwrap_or_default();
        debug!(
            "Resolved {} replies below {} in {} rounds ({} requests)",
            replies.iter().map(CommentNode::count).sum::<usize>(),
            address,
            rounds,
            visited.len()
        );
        Ok(replies)
    }

    pub async fn resolve_forest(&self, roots: Vec<CommentNode>) -> Result<Forest> {
        let replies = try_join_all(roots.iter().map(|root| {
            let address = Address::top_level(root.id.clone());
            async move { self.resolve(&address).await }
        }))
        .await?;

        Ok(roots
            .into_iter()
            .zip(replies)
            .map(|(mut root, children)| {
                root.children = children;
                root
            })
            .collect())
    }

    async fn children_of(&self, parent: &Address) -> Result<Vec<(Address, CommentNode)>> {
        let documents = self.store.query(&Query::replies_of(parent.clone())).await?;
        Ok(decode_documents(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seed;
    use domain::Error;
    use storage::MemoryStore;

    #[tokio::test]
    async fn resolves_nested_replies_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let root = seed(&store, None, "root").await;
        let r1 = seed(&store, Some(&root), "r1").await;
        let r2 = seed(&store, Some(&root), "r2").await;
        let r1a = seed(&store, Some(&r1), "r1a").await;
        seed(&store, Some(&r1a), "r1a-i").await;

        let resolver = ReplyResolver::new(store.clone());
        let replies = resolver.resolve(&root).await.unwrap();

        assert_eq!(replies.len(), 2);
        assert_eq!(&replies[0].id, r2.target());
        assert_eq!(&replies[1].id, r1.target());
        assert_eq!(replies[1].count(), 3);
        assert_eq!(replies[1].depth(), 2);
    }

    #[tokio::test]
    async fn leaf_has_no_replies() {
        let store = Arc::new(MemoryStore::new());
        let root = seed(&store, None, "root").await;
        let resolver = ReplyResolver::new(store.clone());
        assert!(resolver.resolve(&root).await.unwrap().is_empty());
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_replies_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let root = seed(&store, None, "root").await;
        seed(&store, Some(&root), "ok").await;
        store.insert_raw(root.child(domain::NodeId::new("bad").unwrap()), serde_json::json!(42));

        let replies = ReplyResolver::new(store.clone()).resolve(&root).await.unwrap();
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn any_failed_level_fails_the_whole_call() {
        let store = Arc::new(MemoryStore::new());
        let root = seed(&store, None, "root").await;
        seed(&store, Some(&root), "r").await;
        store.fail_next(1);
        let err = ReplyResolver::new(store.clone()).resolve(&root).await.unwrap_err();
        assert!(matches!(err, Error::TransportFailure(_)));
    }

    #[tokio::test]
    async fn forest_gets_replies_per_root() {
        let store = Arc::new(MemoryStore::new());
        let a = seed(&store, None, "a").await;
        let b = seed(&store, None, "b").await;
        seed(&store, Some(&b), "b-r").await;

        let roots = decode_documents(
            store
                .query(&Query::top_level(domain::SortKey::Latest, None, 8))
                .await
                .unwrap(),
        )
        .into_iter()
        .map(|(_, node)| node)
        .collect();
        let forest = ReplyResolver::new(store.clone())
            .resolve_forest(roots)
            .await
            .unwrap();
        assert_eq!(&forest[0].id, b.target());
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(&forest[1].id, a.target());
        assert!(forest[1].children.is_empty());
    }
}
