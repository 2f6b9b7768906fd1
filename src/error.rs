use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

/// ApiError
///
/// The application-wide error taxonomy. Every failure that can escape a handler
/// is a variant here, and the `IntoResponse` implementation maps each variant to
/// its HTTP status plus the uniform `{"success": false, "message": ...}` envelope.
///
/// Infrastructure failures (`Database`, `Storage`) are logged with full detail at
/// the boundary but surfaced to the caller as a generic 500 message.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request fields. Carries the joined per-field messages.
    #[error("{0}")]
    Validation(String),

    /// A path identifier that is not a well-formed UUID. Distinct from `NotFound`.
    #[error("invalid property identifier")]
    InvalidIdentifier,

    #[error("{0}")]
    NotFound(&'static str),

    /// Authorization failure: the requester is neither the owning agent nor an admin.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Missing or invalid bearer credential.
    #[error("authentication required")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Builds a `Validation` error from a list of per-field messages.
    pub fn validation<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joined = messages
            .into_iter()
            .map(Into::into)
            .collect::<Vec<_>>()
            .join("; ");
        ApiError::Validation(joined)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::InvalidIdentifier => (
                StatusCode::BAD_REQUEST,
                "Invalid property identifier".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, (*msg).to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, (*msg).to_string()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            ApiError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Storage(e) => {
                tracing::error!("storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

// --- Envelope-preserving Extractors ---

/// ApiJson
///
/// Drop-in replacement for `axum::Json` as an extractor: a body that fails to
/// parse becomes an `ApiError::Validation`, so even extractor rejections reach
/// the caller in the uniform `{"success": false, "message": ...}` envelope
/// instead of axum's plain-text default.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

/// ApiQuery
///
/// Same treatment for query-string extraction: a malformed query string is a
/// 400 in the envelope, never a bare rejection.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_joins_field_messages() {
        let err = ApiError::validation(["title is required", "price must be non-negative"]);
        assert_eq!(
            err.to_string(),
            "title is required; price must be non-negative"
        );
    }

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            ApiError::InvalidIdentifier.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("Property not found").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Forbidden("nope").into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Storage("s3 down".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
