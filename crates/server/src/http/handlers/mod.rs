pub mod comments;
pub mod reactions;
pub mod replies;
pub mod sse;
