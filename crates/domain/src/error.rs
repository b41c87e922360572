use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The target node or document was absent at mutation time.
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("sign in to post, reply or react")]
    Unauthenticated,

    #[error("comment has {len} characters, the limit is {limit}")]
    ContentTooLong { len: usize, limit: usize },

    #[error("storage request failed: {0:#}")]
    TransportFailure(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("document {0} is not an object")]
    NotAnObject(String),

    #[error("document {path} is malformed: {reason}")]
    Invalid { path: String, reason: String },
}
