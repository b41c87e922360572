use axum::{extract::State, http::StatusCode, Json};
use domain::{Address, CommentNode};
use engine::{ReplyMutator, TreeStore};
use serde::Deserialize;
use std::sync::Arc;
use storage::DocumentStore;

use crate::http::error::{api_error, bad_request, ApiError};
use crate::http::identity::CurrentUser;

#[derive(Deserialize)]
pub struct CreateReplyRequest {
    pub address: String,
    pub content: String,
}

pub async fn post_reply(
    State(store): State<Arc<dyn DocumentStore>>,
    user: CurrentUser,
    Json(payload): Json<CreateReplyRequest>,
) -> Result<(StatusCode, Json<CommentNode>), ApiError> {
    let address = payload.address.parse::<Address>().map_err(bad_request)?;

    let reply = ReplyMutator::new(store, user.provider())
        .add_reply(&mut TreeStore::default(), &address, &payload.content)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(reply)))
}
