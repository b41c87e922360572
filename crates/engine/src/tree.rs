use domain::protocol::preview;
use domain::{Address, CommentNode, Forest, NodeId, SortKey};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNode {
    pub id: NodeId,
    pub address: String,
    pub author_name: String,
    pub author_avatar: String,
    pub body_html: String,
    pub preview: String,
    pub is_truncated: bool,
    pub expanded: bool,
    pub pending: bool,
    pub attachments: Vec<String>,
    pub reactions: Vec<(String, u64)>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub children: Vec<RenderedNode>,
}

struct Slot {
    node: CommentNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Nodes live in an arena keyed by id. Every walk is iterative, so reply
/// depth is bounded only by memory.
pub struct TreeStore {
    sort: SortKey,
    roots: Vec<NodeId>,
    slots: HashMap<NodeId, Slot>,
    expanded: HashSet<NodeId>,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new(SortKey::default())
    }
}

impl TreeStore {
    pub fn new(sort: SortKey) -> Self {
        Self {
            sort,
            roots: Vec::new(),
            slots: HashMap::new(),
            expanded: HashSet::new(),
        }
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn reset(&mut self, sort: SortKey) {
        self.sort = sort;
        self.roots.clear();
        self.slots.clear();
        self.expanded.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&CommentNode> {
        self.slots.get(id).map(|slot| &slot.node)
    }

    /// Upserts every top-level subtree of `forest`. A root already present
    /// is replaced whole by the incoming copy; roots the input does not
    /// mention stay. Display flags survive.
    pub fn merge(&mut self, forest: Forest) {
        for root in forest {
            if self.slots.contains_key(&root.id) {
                self.remove_subtree(&root.id);
            }
            let id = root.id.clone();
            if self.insert_subtree(None, root) {
                self.roots.push(id);
            }
        }
        self.resort();
    }

    pub fn merge_reply_subtree(&mut self, parent: &NodeId, children: Vec<CommentNode>) {
        let Some(slot) = self.slots.get_mut(parent) else {
            debug!("Reply subtree for unknown node {} ignored", parent);
            return;
        };
        let old = std::mem::take(&mut slot.children);
        for child in &old {
            self.remove_subtree(child);
        }
        for child in children {
            let id = child.id.clone();
            if self.insert_subtree(Some(parent), child) {
                if let Some(slot) = self.slots.get_mut(parent) {
                    slot.children.push(id);
                }
            }
        }
    }

    /// Adds one to `emoji` on the node at `address`. Reorders the roots
    /// when a top-level node changes under the popular ordering. Returns
    /// false, changing nothing, when the address does not resolve.
    pub fn apply_reaction_delta(&mut self, address: &Address, emoji: &str) -> bool {
        let Some(id) = self.resolve(address).cloned() else {
            debug!("Reaction for unloaded node {} ignored", address);
            return false;
        };
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.node.reactions.increment(emoji);
        }
        if address.is_top_level() && self.sort == SortKey::Popular {
            self.resort();
        }
        true
    }

    pub fn append_reply(&mut self, address: &Address, node: CommentNode) -> bool {
        let Some(parent) = self.resolve(address).cloned() else {
            debug!("Reply under unloaded node {} ignored", address);
            return false;
        };
        let id = node.id.clone();
        if !self.insert_subtree(Some(&parent), node) {
            return false;
        }
        if let Some(slot) = self.slots.get_mut(&parent) {
            slot.children.push(id);
        }
        true
    }

    /// If the confirmed id is already present (a live snapshot got there
    /// first) the staged copy is simply dropped. If the staged node is gone
    /// (a merge replaced its root) nothing happens.
    pub fn confirm_staged(&mut self, staged: &NodeId, mut confirmed: CommentNode) -> bool {
        if self.slots.contains_key(&confirmed.id) {
            self.remove_subtree(staged);
            return true;
        }
        let Some(mut slot) = self.slots.remove(staged) else {
            return false;
        };

        let new_id = confirmed.id.clone();
        for child in &slot.children {
            if let Some(c) = self.slots.get_mut(child) {
                c.parent = Some(new_id.clone());
            }
        }
        let is_root = slot.parent.is_none();
        let siblings = match &slot.parent {
            Some(parent) => self.slots.get_mut(parent).map(|p| &mut p.children),
            None => Some(&mut self.roots),
        };
        if let Some(siblings) = siblings {
            for sibling in siblings.iter_mut().filter(|s| *s == staged) {
                *sibling = new_id.clone();
            }
        }
        if self.expanded.remove(staged) {
            self.expanded.insert(new_id.clone());
        }

        if !confirmed.children.is_empty() {
            warn!("Confirmed node {} arrived with children; ignored", new_id);
            confirmed.children.clear();
        }
        slot.node = confirmed;
        self.slots.insert(new_id, slot);
        if is_root {
            self.resort();
        }
        true
    }

    pub fn truncate_roots(&mut self, keep: usize) -> usize {
        if self.roots.len() <= keep {
            return 0;
        }
        let dropped = self.roots.split_off(keep);
        for id in &dropped {
            self.remove_subtree(id);
        }
        let slots = &self.slots;
        self.expanded.retain(|id| slots.contains_key(id));
        dropped.len()
    }

    pub fn discard(&mut self, id: &NodeId) -> bool {
        if !self.slots.contains_key(id) {
            return false;
        }
        self.remove_subtree(id);
        true
    }

    pub fn address_of(&self, id: &NodeId) -> Option<Address> {
        let mut chain = vec![id.clone()];
        let mut current = self.slots.get(id)?;
        while let Some(parent) = &current.parent {
            chain.push(parent.clone());
            current = self.slots.get(parent)?;
        }
        chain.reverse();
        let mut ids = chain.into_iter();
        let root = ids.next()?;
        Some(Address {
            root,
            replies: ids.collect(),
        })
    }

    pub fn toggle_expanded(&mut self, id: &NodeId) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.clone());
            true
        }
    }

    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.expanded.contains(id)
    }

    pub fn forest(&self) -> Forest {
        self.roots
            .iter()
            .filter_map(|root| {
                self.assemble(root, |slot, _, children| CommentNode {
                    children,
                    ..slot.node.clone()
                })
            })
            .collect()
    }

    pub fn subtree(&self, id: &NodeId) -> Option<CommentNode> {
        self.assemble(id, |slot, _, children| CommentNode {
            children,
            ..slot.node.clone()
        })
    }

    pub fn view(&self, preview_chars: usize) -> Vec<RenderedNode> {
        self.roots
            .iter()
            .filter_map(|root| {
                self.assemble(root, |slot, address, children| {
                    let node = &slot.node;
                    let (preview, is_truncated) = preview(&node.body_html, preview_chars);
                    RenderedNode {
                        id: node.id.clone(),
                        address: address.to_string(),
                        author_name: node.author.name.clone(),
                        author_avatar: node.author.avatar_url.clone(),
                        body_html: node.body_html.clone(),
                        preview,
                        is_truncated,
                        expanded: self.expanded.contains(&node.id),
                        pending: node.is_pending(),
                        attachments: node.attachments.clone(),
                        reactions: node
                            .reactions
                            .iter()
                            .map(|(emoji, count)| (emoji.to_string(), count))
                            .collect(),
                        created_at: node.created_at,
                        children,
                    }
                })
            })
            .collect()
    }

    fn resolve<'a>(&self, address: &'a Address) -> Option<&'a NodeId> {
        let root = self.slots.get(&address.root)?;
        if root.parent.is_some() {
            return None;
        }
        let mut current = root;
        for id in &address.replies {
            if !current.children.contains(id) {
                return None;
            }
            current = self.slots.get(id)?;
        }
        Some(address.target())
    }

    fn assemble<T>(&self, root: &NodeId, build: impl Fn(&Slot, &Address, Vec<T>) -> T) -> Option<T> {
        let start = self.address_of(root)?;
        // preorder puts every node before its descendants
        let mut order: Vec<(&NodeId, Address)> = Vec::new();
        let mut stack = vec![(root, start)];
        while let Some((id, address)) = stack.pop() {
            if let Some(slot) = self.slots.get(id) {
                for child in slot.children.iter().rev() {
                    stack.push((child, address.child(child.clone())));
                }
            }
            order.push((id, address));
        }

        let mut built: HashMap<&NodeId, T> = HashMap::new();
        for (id, address) in order.into_iter().rev() {
            let Some(slot) = self.slots.get(id) else {
                continue;
            };
            let children = slot
                .children
                .iter()
                .filter_map(|child| built.remove(child))
                .collect();
            built.insert(id, build(slot, &address, children));
        }
        built.remove(root)
    }

    /// Inserts a nested subtree under `parent` (or as a root). Ids already in
    /// the arena are skipped along with their subtrees. The caller links the
    /// top node into its parent.
    fn insert_subtree(&mut self, parent: Option<&NodeId>, node: CommentNode) -> bool {
        if self.slots.contains_key(&node.id) {
            warn!("Node {} is already loaded; duplicate skipped", node.id);
            return false;
        }
        let mut reserved: HashSet<NodeId> = HashSet::from([node.id.clone()]);
        let mut stack = vec![(parent.cloned(), node)];
        while let Some((parent, mut node)) = stack.pop() {
            let mut child_ids = Vec::with_capacity(node.children.len());
            for child in std::mem::take(&mut node.children) {
                if self.slots.contains_key(&child.id) || !reserved.insert(child.id.clone()) {
                    warn!("Node {} is already loaded; duplicate skipped", child.id);
                    continue;
                }
                child_ids.push(child.id.clone());
                stack.push((Some(node.id.clone()), child));
            }
            self.slots.insert(
                node.id.clone(),
                Slot {
                    node,
                    parent,
                    children: child_ids,
                },
            );
        }
        true
    }

    fn remove_subtree(&mut self, id: &NodeId) {
        let parent = self.slots.get(id).and_then(|slot| slot.parent.clone());
        match parent {
            Some(parent) => {
                if let Some(slot) = self.slots.get_mut(&parent) {
                    slot.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }

        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(slot) = self.slots.remove(&next) {
                stack.extend(slot.children);
            }
        }
    }

    fn resort(&mut self) {
        let sort = self.sort;
        let slots = &self.slots;
        self.roots
            .sort_by(|a, b| match (slots.get(a), slots.get(b)) {
                (Some(x), Some(y)) => sort.compare(&x.node, &y.node),
                _ => Ordering::Equal,
            });
    }
}
