//! Caller identity.
//!
//! Authentication happens upstream; the acting user arrives as a UUID in the
//! `x-user-id` header and is trusted as given.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};

use slotswap_domain::UserId;
use uuid::Uuid;

use crate::api::ErrorResponse;

/// Header carrying the acting user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The acting user of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| unauthorized("Missing x-user-id header"))?;

        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(AuthenticatedUser)
            .ok_or_else(|| unauthorized("Malformed x-user-id header"))
    }
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(message, "unauthenticated")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<AuthenticatedUser, StatusCode> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await.map_err(|(status, _)| status)
    }

    #[tokio::test]
    async fn test_valid_header() {
        let id = Uuid::now_v7();
        let user = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(user, AuthenticatedUser(id));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_unauthorized() {
        assert_eq!(extract(None).await.unwrap_err(), StatusCode::UNAUTHORIZED);
        assert_eq!(extract(Some("alice")).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }
}
