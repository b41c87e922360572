use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::Identity;
use engine::{IdentityProvider, StaticIdentity};
use std::convert::Infallible;
use std::sync::Arc;

/// No `x-user-id` header means an anonymous request.
pub struct CurrentUser(pub Option<Identity>);

impl CurrentUser {
    pub fn provider(self) -> Arc<dyn IdentityProvider> {
        Arc::new(match self.0 {
            Some(identity) => StaticIdentity::signed_in(identity),
            None => StaticIdentity::anonymous(),
        })
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(CurrentUser(header("x-user-id").map(|uid| Identity {
            uid,
            display_name: header("x-user-name"),
            photo_url: header("x-user-photo"),
        })))
    }
}
