use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::options::PageOptions;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub rdata: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<PageOptions>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, rdata: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            rdata,
            options: None,
        }
    }

    /// Attach the cursor the client should send back for the next page.
    pub fn with_options(self, options: PageOptions) -> Self {
        Self {
            options: Some(options),
            ..self
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let json = match serde_json::to_string(&self) {
            Ok(json) => json,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };

        (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], json).into_response()
    }
}
