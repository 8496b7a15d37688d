//! Gateway error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tollgate_kernel::admission::AdmissionError;
use tollgate_kernel::config::ConfigError;

/// Gateway-level errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid admission configuration: {0}")]
    Config(#[from] AdmissionError),

    #[error("failed to load settings: {0}")]
    Settings(#[from] ConfigError),

    #[error("no route matched '{0}'")]
    RouteNotFound(String),

    #[error("method '{0}' is not supported")]
    MethodNotAllowed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::RouteNotFound(_) => (StatusCode::NOT_FOUND, "ROUTE_NOT_FOUND"),
            GatewayError::MethodNotAllowed(_) => {
                (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED")
            }
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            GatewayError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE"),
            GatewayError::Config(_) | GatewayError::Settings(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
            GatewayError::Io(_) | GatewayError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: GatewayError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn errors_render_as_coded_json() {
        let (status, body) = render(GatewayError::RouteNotFound("/nope".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "ROUTE_NOT_FOUND");
        assert_eq!(body["error"]["message"], "no route matched '/nope'");

        let (status, body) = render(GatewayError::MethodNotAllowed("TRACE".into())).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn config_errors_are_internal() {
        let (status, body) = render(AdmissionError::EmptyRouteId.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
    }
}
