use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const THUMBS_UP: &str = "👍";

/// Prefix of ids the client gives to nodes it has not persisted yet.
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() {
            return Err("Node ID cannot be empty.".to_string());
        }
        if s.contains('/') || s.contains(':') {
            return Err("Node ID cannot contain '/' or ':'.".to_string());
        }
        if s.len() > 128 {
            return Err("Node ID is too long (max 128 chars).".to_string());
        }
        Ok(Self(s))
    }

    pub fn new_unchecked(s: String) -> Self {
        Self(s)
    }

    pub fn local(seq: u64) -> Self {
        Self(format!("{}{}", LOCAL_ID_PREFIX, seq))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub root: NodeId,
    #[serde(default)]
    pub replies: Vec<NodeId>,
}

impl Address {
    pub const COLLECTION: &'static str = "comments";
    pub const REPLIES: &'static str = "replies";

    pub fn top_level(root: NodeId) -> Self {
        Self {
            root,
            replies: Vec::new(),
        }
    }

    pub fn child(&self, id: NodeId) -> Self {
        let mut replies = self.replies.clone();
        replies.push(id);
        Self {
            root: self.root.clone(),
            replies,
        }
    }

    pub fn parent(&self) -> Option<Self> {
        let mut replies = self.replies.clone();
        replies.pop()?;
        Some(Self {
            root: self.root.clone(),
            replies,
        })
    }

    pub fn target(&self) -> &NodeId {
        self.replies.last().unwrap_or(&self.root)
    }

    pub fn depth(&self) -> usize {
        self.replies.len()
    }

    pub fn is_top_level(&self) -> bool {
        self.replies.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        std::iter::once(&self.root).chain(self.replies.iter())
    }

    pub fn replies_path(&self) -> String {
        format!("{}/{}", self, Self::REPLIES)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Self::COLLECTION, self.root)?;
        for id in &self.replies {
            write!(f, "/{}/{}", Self::REPLIES, id)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        if parts.next() != Some(Self::COLLECTION) {
            return Err(format!("Path must start with '{}/': {}", Self::COLLECTION, s));
        }
        let root = NodeId::new(parts.next().unwrap_or(""))?;
        let mut replies = Vec::new();
        while let Some(segment) = parts.next() {
            if segment != Self::REPLIES {
                return Err(format!("Unexpected path segment '{}' in {}", segment, s));
            }
            replies.push(NodeId::new(parts.next().unwrap_or(""))?);
        }
        Ok(Self { root, replies })
    }
}

/// Emoji → count. Zero counts are never stored, so an absent emoji and a
/// zero count compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u64>")]
pub struct Reactions(BTreeMap<String, u64>);

impl Reactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, emoji: &str) -> u64 {
        self.0.get(emoji).copied().unwrap_or(0)
    }

    pub fn set(&mut self, emoji: impl Into<String>, count: u64) {
        let emoji = emoji.into();
        if count == 0 {
            self.0.remove(&emoji);
        } else {
            self.0.insert(emoji, count);
        }
    }

    pub fn increment(&mut self, emoji: &str) -> u64 {
        let next = self.get(emoji).saturating_add(1);
        self.set(emoji, next);
        next
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u64)> for Reactions {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut reactions = Self::new();
        for (emoji, count) in iter {
            reactions.set(emoji, count);
        }
        reactions
    }
}

impl From<BTreeMap<String, u64>> for Reactions {
    fn from(counts: BTreeMap<String, u64>) -> Self {
        counts.into_iter().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl From<&Identity> for Author {
    fn from(identity: &Identity) -> Self {
        Author {
            id: identity.uid.clone(),
            name: identity.display_name.clone().unwrap_or_default(),
            avatar_url: identity.photo_url.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: NodeId,
    pub author: Author,
    pub body_html: String,
    pub attachments: Vec<String>,
    pub reactions: Reactions,
    /// `None` while an optimistic node waits for the server.
    pub created_at: Option<DateTime<Utc>>,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    pub fn is_pending(&self) -> bool {
        self.created_at.is_none()
    }

    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.children.iter());
        }
        total
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }
}

pub type Forest = Vec<CommentNode>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Latest,
    Popular,
}

impl SortKey {
    pub fn value_of(self, node: &CommentNode) -> i64 {
        match self {
            // pending nodes are newer than anything the server has stamped
            SortKey::Latest => node
                .created_at
                .map(|t| t.timestamp_micros())
                .unwrap_or(i64::MAX),
            SortKey::Popular => i64::try_from(node.reactions.get(THUMBS_UP)).unwrap_or(i64::MAX),
        }
    }

    /// Total order: primary value descending, then id ascending.
    pub fn compare(self, a: &CommentNode, b: &CommentNode) -> Ordering {
        self.value_of(b)
            .cmp(&self.value_of(a))
            .then_with(|| a.id.cmp(&b.id))
    }

    pub fn sort(self, forest: &mut [CommentNode]) {
        forest.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Latest => write!(f, "latest"),
            SortKey::Popular => write!(f, "popular"),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(SortKey::Latest),
            "popular" => Ok(SortKey::Popular),
            other => Err(format!("Unknown sort option: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub key: i64,
    pub id: NodeId,
}

impl PageCursor {
    pub fn after(node: &CommentNode, sort: SortKey) -> Self {
        Self {
            key: sort.value_of(node),
            id: node.id.clone(),
        }
    }

    pub fn admits(&self, key: i64, id: &NodeId) -> bool {
        key < self.key || (key == self.key && *id > self.id)
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.id)
    }
}

impl FromStr for PageCursor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, id) = s
            .split_once(':')
            .ok_or_else(|| "invalid cursor format; expected <key>:<id>".to_string())?;
        let key = key
            .parse::<i64>()
            .map_err(|_| "invalid cursor format".to_string())?;
        Ok(Self {
            key,
            id: NodeId::new(id)?,
        })
    }
}
