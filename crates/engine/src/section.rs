use crate::collaborators::{Attachment, BlobStore, IdentityProvider};
use crate::composer::CommentComposer;
use crate::pagination::PaginationCursor;
use crate::reactions::ReactionAggregator;
use crate::realtime::{LiveForest, RealtimeSync, LIVE_WINDOW};
use crate::replies::ReplyMutator;
use crate::resolver::ReplyResolver;
use crate::settings::WidgetSettings;
use crate::tree::{RenderedNode, TreeStore};
use domain::{Address, CommentNode, Forest, NodeId, Reactions, Result, SortKey};
use std::sync::Arc;
use storage::DocumentStore;
use tracing::{debug, info, warn};

pub struct CommentSection {
    store: Arc<dyn DocumentStore>,
    tree: TreeStore,
    pages: PaginationCursor,
    resolver: ReplyResolver,
    reactions: ReactionAggregator,
    replies: ReplyMutator,
    composer: CommentComposer,
    live: Option<RealtimeSync>,
    settings: WidgetSettings,
}

impl CommentSection {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        blobs: Arc<dyn BlobStore>,
        settings: WidgetSettings,
    ) -> Self {
        let sort = SortKey::default();
        Self {
            tree: TreeStore::new(sort),
            pages: PaginationCursor::new(store.clone(), sort),
            resolver: ReplyResolver::new(store.clone()),
            reactions: ReactionAggregator::new(
                store.clone(),
                identity.clone(),
                settings.reaction_strategy,
            ),
            replies: ReplyMutator::new(store.clone(), identity.clone()),
            composer: CommentComposer::new(store.clone(), identity, blobs),
            live: None,
            settings,
            store,
        }
    }

    pub fn sort(&self) -> SortKey {
        self.tree.sort()
    }

    pub async fn open(&mut self) -> Result<()> {
        let sort = self.sort();
        self.set_sort(sort).await
    }

    /// The first page is fetched before anything is discarded, so a failed
    /// switch leaves the section as it was.
    pub async fn set_sort(&mut self, sort: SortKey) -> Result<()> {
        let mut pages = PaginationCursor::new(self.store.clone(), sort);
        let roots = pages.next_page().await?;
        let forest = self.resolver.resolve_forest(roots).await?;

        if let Some(mut live) = self.live.take() {
            live.teardown();
        }
        self.pages = pages;
        self.tree.reset(sort);
        self.tree.merge(forest);
        if sort == SortKey::Latest {
            self.live = Some(RealtimeSync::start(self.store.clone()));
        }
        info!("Comment section showing {} ({} nodes)", sort, self.tree.len());
        Ok(())
    }

    /// The cursor only moves once the page's replies are in.
    pub async fn load_more(&mut self) -> Result<usize> {
        let page = self.pages.fetch_next().await?;
        let forest = self.resolver.resolve_forest(page.nodes).await?;
        self.pages.commit(page.cursor, page.fetched);
        let added = forest.len();
        self.tree.merge(forest);
        Ok(added)
    }

    pub fn has_more(&self) -> bool {
        !self.pages.is_exhausted()
    }

    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(RealtimeSync::is_active)
    }

    pub async fn sync_live(&mut self) -> Option<u64> {
        loop {
            let item = self.live.as_mut()?.recv().await?;
            match item {
                Ok(live) => return Some(self.apply_live(live)),
                Err(e) => warn!("Live snapshot dropped: {}", e),
            }
        }
    }

    pub fn apply_live(&mut self, live: LiveForest) -> u64 {
        if self.sort() == SortKey::Latest {
            self.tree.merge(live.forest);
        }
        live.version
    }

    /// Drops roots that fell out of the live window. For views that never
    /// page: nothing refreshes those roots once the feed stops sending them.
    pub fn trim_to_live_window(&mut self) {
        let dropped = self.tree.truncate_roots(LIVE_WINDOW);
        if dropped > 0 {
            debug!("Dropped {} comments outside the live window", dropped);
        }
    }

    pub async fn react(&mut self, address: &Address, emoji: &str) -> Result<Reactions> {
        self.reactions.react(&mut self.tree, address, emoji).await
    }

    pub async fn reply(&mut self, address: &Address, content_html: &str) -> Result<CommentNode> {
        self.replies.add_reply(&mut self.tree, address, content_html).await
    }

    pub async fn post(&mut self, content_html: &str, attachments: Vec<Attachment>) -> Result<CommentNode> {
        self.composer.post(&mut self.tree, content_html, attachments).await
    }

    pub fn toggle_expanded(&mut self, id: &NodeId) -> bool {
        self.tree.toggle_expanded(id)
    }

    pub fn view(&self) -> Vec<RenderedNode> {
        self.tree.view(self.settings.preview_chars)
    }

    pub fn forest(&self) -> Forest {
        self.tree.forest()
    }

    pub fn tree(&self) -> &TreeStore {
        &self.tree
    }

    pub fn close(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.teardown();
        }
    }
}
