mod error;
mod events;
mod models;
pub mod protocol;

pub use error::{Error, Result, SchemaError};
pub use events::{ChangeNotice, Snapshot};
pub use models::{
    Address, Author, CommentNode, Forest, Identity, NodeId, PageCursor, Reactions, SortKey,
    LOCAL_ID_PREFIX, THUMBS_UP,
};
