//! Builders shared by the engine's tests.

use crate::collaborators::{IdentityProvider, StaticIdentity};
use chrono::DateTime;
use domain::protocol::build_node_document;
use domain::{Address, Author, CommentNode, Identity, NodeId, Reactions};
use std::sync::Arc;
use storage::{DocumentStore, MemoryStore};

pub(crate) fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

pub(crate) fn addr(path: &str) -> Address {
    path.parse().unwrap()
}

pub(crate) fn node(id_: &str, micros: i64) -> CommentNode {
    CommentNode {
        id: id(id_),
        author: Author::default(),
        body_html: format!("<p>{}</p>", id_),
        attachments: Vec::new(),
        reactions: Reactions::new(),
        created_at: DateTime::from_timestamp_micros(micros),
        children: Vec::new(),
    }
}

pub(crate) fn with_children(mut parent: CommentNode, children: Vec<CommentNode>) -> CommentNode {
    parent.children = children;
    parent
}

/// `root` with a single reply chain `depth` levels deep below it.
pub(crate) fn chain(root: &str, depth: usize) -> CommentNode {
    let mut tip = node(&format!("{}-{}", root, depth), depth as i64 + 1);
    for level in (1..depth).rev() {
        tip = with_children(node(&format!("{}-{}", root, level), level as i64 + 1), vec![tip]);
    }
    with_children(node(root, 1), vec![tip])
}

pub(crate) fn alice() -> Identity {
    Identity {
        uid: "u-alice".into(),
        display_name: Some("Alice".into()),
        photo_url: Some("https://img/alice.png".into()),
    }
}

pub(crate) fn signed_in() -> Arc<dyn IdentityProvider> {
    Arc::new(StaticIdentity::signed_in(alice()))
}

pub(crate) fn anonymous() -> Arc<dyn IdentityProvider> {
    Arc::new(StaticIdentity::anonymous())
}

pub(crate) async fn seed(store: &MemoryStore, parent: Option<&Address>, text: &str) -> Address {
    let author = Author::from(&alice());
    store
        .create(parent, build_node_document(&author, text, &[]))
        .await
        .unwrap()
        .unwrap()
        .address
}
