//! Mapping from [`FurtherError`] to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use further_shared::{FurtherError, ProcessingKind};

/// Handler error: a [`FurtherError`] rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError(pub FurtherError);

impl From<FurtherError> for ApiError {
    fn from(err: FurtherError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Status code for an error.
pub fn status_for(err: &FurtherError) -> StatusCode {
    match err {
        FurtherError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FurtherError::Forbidden { .. } => StatusCode::FORBIDDEN,
        FurtherError::NotFound { .. } => StatusCode::NOT_FOUND,
        FurtherError::Unsupported { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        FurtherError::Processing {
            kind: ProcessingKind::ChapterNotFound,
            ..
        } => StatusCode::NOT_FOUND,
        FurtherError::Processing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FurtherError::Network(_) | FurtherError::HttpStatus { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn maps_every_class() {
        let cases = [
            (FurtherError::validation("bad"), 422),
            (FurtherError::Forbidden { path: PathBuf::from("/x") }, 403),
            (FurtherError::not_found("gone"), 404),
            (FurtherError::unsupported("txt"), 415),
            (
                FurtherError::processing(ProcessingKind::ChapterNotFound, "no", "/a.epub", "chapter_lookup"),
                404,
            ),
            (
                FurtherError::processing(ProcessingKind::PageOutOfRange, "no", "/a.pdf", "page_text"),
                422,
            ),
            (FurtherError::Network("down".into()), 502),
            (FurtherError::HttpStatus { url: "u".into(), status: 503 }, 502),
            (FurtherError::parse("junk"), 500),
            (FurtherError::config("bad"), 500),
        ];
        for (err, code) in cases {
            assert_eq!(status_for(&err).as_u16(), code, "{err}");
        }
    }
}
