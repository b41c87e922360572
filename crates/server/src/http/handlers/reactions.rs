use axum::{extract::State, Json};
use domain::{Address, Reactions};
use engine::{ReactionAggregator, TreeStore};
use serde::{Deserialize, Serialize};

use crate::http::error::{api_error, bad_request, ApiError};
use crate::http::identity::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReactRequest {
    pub address: String,
    pub emoji: String,
}

#[derive(Serialize)]
pub struct ReactResponse {
    pub address: String,
    pub reactions: Reactions,
}

pub async fn post_reaction(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<ReactRequest>,
) -> Result<Json<ReactResponse>, ApiError> {
    let address = payload.address.parse::<Address>().map_err(bad_request)?;
    let emoji = payload.emoji.trim();
    if emoji.is_empty() || emoji.chars().count() > 16 {
        return Err(bad_request("emoji must be 1 to 16 characters"));
    }

    let aggregator =
        ReactionAggregator::new(state.store.clone(), user.provider(), state.widget.reaction_strategy);
    let reactions = aggregator
        .react(&mut TreeStore::default(), &address, emoji)
        .await
        .map_err(api_error)?;

    Ok(Json(ReactResponse {
        address: address.to_string(),
        reactions,
    }))
}
