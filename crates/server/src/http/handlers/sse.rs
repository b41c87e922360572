use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use engine::CommentSection;
use futures::stream::{self, Stream};

use crate::http::error::{api_error, ApiError};
use crate::http::identity::CurrentUser;
use crate::state::AppState;

/// One `forest` event on connect, then one per live merge that changes it.
pub async fn live_comments(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let mut section = CommentSection::new(
        state.store.clone(),
        user.provider(),
        state.blobs.clone(),
        state.widget.clone(),
    );
    section.open().await.map_err(api_error)?;
    tracing::info!("Live view connected ({} nodes)", section.tree().len());

    // `last` is the payload most recently sent; the feed's first snapshot
    // usually repeats what `open` loaded
    let stream = stream::unfold((section, None::<String>), |(mut section, mut last)| async move {
        loop {
            if last.is_some() {
                let version = section.sync_live().await?;
                section.trim_to_live_window();
                tracing::debug!("Live forest v{} merged", version);
            }
            let payload = match serde_json::to_string(&section.view()) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("SSE serialization error: {}", e);
                    let last = last.or_else(|| Some(String::new()));
                    return Some((Err(axum::Error::new(e)), (section, last)));
                }
            };
            if last.as_deref() == Some(payload.as_str()) {
                continue;
            }
            last = Some(payload.clone());
            let event = Event::default().event("forest").data(payload);
            return Some((Ok(event), (section, last)));
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15))))
}
