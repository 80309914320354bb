use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::{self, Debug};

pub const INVALID_STATE: i32 = 100;
pub const INVALID_ARGUMENT: i32 = 101;
pub const NOT_FOUND: i32 = 102;
pub const FORBIDDEN: i32 = 103;
pub const CONFLICT: i32 = 104;
pub const RATE_LIMITED: i32 = 105;
pub const UNAUTHORIZED: i32 = 106;

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        upstream_error(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("serialization failure: {}", err);
        Error {
            code: 5,
            message: "serialization error".into(),
        }
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        tracing::error!("authorizor failure: {}", err);
        Error {
            code: 6,
            message: "authorization engine error".into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            INVALID_STATE | CONFLICT => (StatusCode::CONFLICT, self.message.as_str()),
            NOT_FOUND => (StatusCode::NOT_FOUND, self.message.as_str()),
            FORBIDDEN => (StatusCode::FORBIDDEN, self.message.as_str()),
            RATE_LIMITED => (StatusCode::TOO_MANY_REQUESTS, self.message.as_str()),
            UNAUTHORIZED => (StatusCode::UNAUTHORIZED, self.message.as_str()),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl Error {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_STATE,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_ARGUMENT,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            code: FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            code: CONFLICT,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            code: RATE_LIMITED,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            code: UNAUTHORIZED,
            message: "missing or malformed caller identity".into(),
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        self.code == INVALID_STATE
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.code == INVALID_ARGUMENT
    }

    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND
    }

    pub fn is_forbidden(&self) -> bool {
        self.code == FORBIDDEN
    }

    pub fn is_conflict(&self) -> bool {
        self.code == CONFLICT
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == RATE_LIMITED
    }

    pub fn is_internal(&self) -> bool {
        (1..=99).contains(&self.code)
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn config_error(key: &str) -> Error {
    Error {
        code: 1,
        message: format!("invalid configuration value for {}", key),
    }
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!("database failure: {:?}", err);
    Error {
        code: 2,
        message: "database error".into(),
    }
}

pub fn upstream_error<T: Debug>(err: T) -> Error {
    tracing::debug!("upstream failure: {:?}", err);
    Error {
        code: 4,
        message: "upstream error".into(),
    }
}

#[test]
fn internal_errors_hide_their_message() {
    let response = database_error("connection reset").into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn caller_errors_map_to_http_categories() {
    let cases = [
        (Error::invalid_state("x"), StatusCode::CONFLICT),
        (Error::invalid_argument("x"), StatusCode::BAD_REQUEST),
        (Error::not_found("x"), StatusCode::NOT_FOUND),
        (Error::forbidden("x"), StatusCode::FORBIDDEN),
        (Error::conflict("x"), StatusCode::CONFLICT),
        (Error::rate_limited("x"), StatusCode::TOO_MANY_REQUESTS),
        (Error::unauthorized(), StatusCode::UNAUTHORIZED),
    ];

    for (err, status) in cases {
        assert!(!err.is_internal());
        assert_eq!(err.into_response().status(), status);
    }
}
