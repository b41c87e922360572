//! Client-side engine of a threaded comment section: keeps a forest of
//! comments and replies of any depth in sync with a document store.

mod collaborators;
mod composer;
mod pagination;
mod reactions;
mod realtime;
mod replies;
mod resolver;
mod section;
mod settings;
mod tree;

#[cfg(test)]
mod testing;

pub use collaborators::{
    Attachment, BlobStore, IdentityProvider, MemoryBlobStore, PendingFile, StaticIdentity,
};
pub use composer::{ensure_within_limit, CommentComposer};
pub use pagination::{fetch_page, Page, PaginationCursor, PAGE_SIZE};
pub use reactions::{ReactionAggregator, ReactionStrategy};
pub use realtime::{LiveForest, RealtimeSync, LIVE_WINDOW};
pub use replies::ReplyMutator;
pub use resolver::ReplyResolver;
pub use section::CommentSection;
pub use settings::WidgetSettings;
pub use tree::{RenderedNode, TreeStore};

pub use domain::{Error, Result};
