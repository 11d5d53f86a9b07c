use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

/// Envelope shape a response is wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{"success": true, "data": …}`
    Success,
    /// `{"success": true, "count": n, "data": […]}`
    List,
    /// `{"status": "success", "data": …}`, used by single bootcamps,
    /// courses and accounts.
    Status,
}

/// Wrapper for API responses that automatically adds the envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: Option<StatusCode>,
    pub envelope: Envelope,
    pub count: Option<usize>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: None,
            envelope: Envelope::Success,
            count: None,
        }
    }

    /// Create an API response with custom status code
    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::success(data)
        }
    }

    /// Create a 201 Created response
    pub fn created(data: T) -> Self {
        Self::with_status(data, StatusCode::CREATED)
    }

    pub fn status(data: T) -> Self {
        Self {
            envelope: Envelope::Status,
            ..Self::success(data)
        }
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// List response carrying the number of items returned.
    pub fn list(data: Vec<T>) -> Self {
        Self {
            count: Some(data.len()),
            envelope: Envelope::List,
            ..Self::success(data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        // Convert data to JSON Value for consistent envelope format
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "error": "Failed to serialize response data"
                    })),
                )
                    .into_response();
            }
        };

        let envelope = wrap(self.envelope, self.count, data_value);
        (status, Json(envelope)).into_response()
    }
}

fn wrap(envelope: Envelope, count: Option<usize>, data: Value) -> Value {
    match envelope {
        Envelope::Success => json!({ "success": true, "data": data }),
        Envelope::List => json!({ "success": true, "count": count.unwrap_or(0), "data": data }),
        Envelope::Status => json!({ "status": "success", "data": data }),
    }
}

// Convenience type alias
pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
