use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use domain::{CommentNode, PageCursor, SortKey};
use engine::{fetch_page, Attachment, CommentComposer, RenderedNode, ReplyResolver, TreeStore, PAGE_SIZE};
use serde::{Deserialize, Serialize};

use crate::http::error::{api_error, bad_request, ApiError};
use crate::http::identity::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub sort: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct PageResponse {
    pub comments: Vec<RenderedNode>,
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse>, ApiError> {
    let sort = match query.sort.as_deref() {
        None | Some("") => SortKey::default(),
        Some(raw) => raw.parse::<SortKey>().map_err(bad_request)?,
    };
    let cursor = match query.cursor.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<PageCursor>().map_err(bad_request)?),
    };

    let page = fetch_page(state.store.as_ref(), sort, cursor.as_ref(), PAGE_SIZE)
        .await
        .map_err(api_error)?;
    let forest = ReplyResolver::new(state.store.clone())
        .resolve_forest(page.nodes)
        .await
        .map_err(api_error)?;

    let mut tree = TreeStore::new(sort);
    tree.merge(forest);
    let next_cursor = if page.fetched == PAGE_SIZE {
        page.cursor.map(|c| c.to_string())
    } else {
        None
    };

    Ok(Json(PageResponse {
        comments: tree.view(state.widget.preview_chars),
        next_cursor,
    }))
}

pub async fn post_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentNode>), ApiError> {
    let composer = CommentComposer::new(state.store.clone(), user.provider(), state.blobs.clone());
    let attachments = payload.attachments.into_iter().map(Attachment::Url).collect();

    let node = composer
        .post(&mut TreeStore::default(), &payload.content, attachments)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(node)))
}
