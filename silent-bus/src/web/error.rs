//! Mapping of service errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::busnearby::ApiError;
use crate::config::ConfigError;
use crate::coordinator::CoordinatorError;
use crate::registry::RegistryError;
use crate::setup::SetupError;

use super::dto::ErrorResponse;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    NotFound { message: String },

    /// BusNearby failed or could not be reached
    #[error("{message}")]
    BadGateway { message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        let message = e.to_string();
        match e {
            ApiError::NotFound(_) => AppError::NotFound { message },
            _ => AppError::BadGateway { message },
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        let message = e.to_string();
        match e {
            RegistryError::UnknownEntry(_) => AppError::NotFound { message },
            RegistryError::Setup(SetupError::StationNotFound(_)) => AppError::NotFound { message },
            RegistryError::Setup(SetupError::CannotConnect(_)) => AppError::BadGateway { message },
            RegistryError::Setup(_) => AppError::BadRequest { message },
            RegistryError::Config(
                ConfigError::ReadError { .. }
                | ConfigError::WriteError { .. }
                | ConfigError::ParseError(_),
            ) => AppError::Internal { message },
            RegistryError::Config(ConfigError::UnknownEntry(_)) => AppError::NotFound { message },
            RegistryError::Config(_) => AppError::BadRequest { message },
            RegistryError::Coordinator(CoordinatorError::NotAStopTarget) => {
                AppError::BadRequest { message }
            }
            RegistryError::Coordinator(CoordinatorError::FetchFailed(_))
            | RegistryError::NotReady { .. } => AppError::BadGateway { message },
            RegistryError::ShuttingDown => AppError::Internal { message },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = %status, error = %message, "Request failed");
        } else {
            warn!(status = %status, error = %message, "Request rejected");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
