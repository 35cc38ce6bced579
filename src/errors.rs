use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

/// Error types surfaced by the backend clients and scripts.
#[derive(Debug)]
pub enum AppError {
    /// Direct Postgres errors (schema inspection only).
    DatabaseError(sqlx::Error),
    /// Sign-up or sign-in rejected by the auth service.
    AuthError(String),
    /// Row-level security or role check refused the request.
    PermissionDenied(String),
    /// A table constraint (not-null, unique, foreign key, check) rejected the write.
    ConstraintViolation {
        /// Postgres SQLSTATE, e.g. `23505`.
        code: String,
        /// Message reported by the backend.
        message: String,
    },
    /// Resource or row not found.
    NotFound(String),
    /// A `single`/`maybe_single` query matched more rows than allowed.
    Cardinality(String),
    /// Any other non-success response or transport failure.
    ExternalApiError(String),
    /// Missing or invalid configuration.
    Config(String),
    /// Internal error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::AuthError(msg) => write!(f, "Auth error: {}", msg),
            AppError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            AppError::ConstraintViolation { code, message } => {
                write!(f, "Constraint violation ({}): {}", code, message)
            }
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Cardinality(msg) => write!(f, "Unexpected row count: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::DatabaseError(e) => Some(e),
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    /// Strips any `WithContext` wrappers and returns the innermost error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self.root(), AppError::PermissionDenied(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root(), AppError::ConstraintViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), AppError::NotFound(_))
    }
}

// Make AppError cloneable for WithContext variant
impl Clone for AppError {
    /// Note: `sqlx::Error` is not cloneable, so `DatabaseError` is simplified to `RowNotFound` during cloning.
    fn clone(&self) -> Self {
        match self {
            AppError::DatabaseError(_e) => AppError::DatabaseError(sqlx::Error::RowNotFound),
            AppError::AuthError(msg) => AppError::AuthError(msg.clone()),
            AppError::PermissionDenied(msg) => AppError::PermissionDenied(msg.clone()),
            AppError::ConstraintViolation { code, message } => AppError::ConstraintViolation {
                code: code.clone(),
                message: message.clone(),
            },
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::Cardinality(msg) => AppError::Cardinality(msg.clone()),
            AppError::ExternalApiError(msg) => AppError::ExternalApiError(msg.clone()),
            AppError::Config(msg) => AppError::Config(msg.clone()),
            AppError::InternalError(msg) => AppError::InternalError(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

/// Error body returned by the tables API.
#[derive(Debug, Default, Deserialize)]
pub struct RestErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// Maps a failed tables-API response onto the error taxonomy.
///
/// Postgres SQLSTATE codes take precedence over the HTTP status: `42501` is an RLS
/// refusal, class `23` is a constraint violation, and `PGRST116` is the cardinality
/// error raised when a single-object request does not match exactly one row.
pub fn classify_rest_error(status: StatusCode, body: &str) -> AppError {
    let parsed: RestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{} {}", status, body.trim()));

    match parsed.code.as_deref() {
        Some("42501") => return AppError::PermissionDenied(message),
        Some(code) if code.starts_with("23") => {
            return AppError::ConstraintViolation {
                code: code.to_string(),
                message,
            }
        }
        Some("PGRST116") => {
            let details = parsed.details.unwrap_or_default();
            return if details.contains(" 0 rows") {
                AppError::NotFound(details)
            } else {
                AppError::Cardinality(if details.is_empty() { message } else { details })
            };
        }
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::PermissionDenied(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::ConstraintViolation {
            code: parsed.code.unwrap_or_else(|| "409".to_string()),
            message,
        },
        _ => AppError::ExternalApiError(format!("tables API returned {}: {}", status, message)),
    }
}

/// Error body returned by the auth service. Older and newer versions disagree on field names.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub fn classify_auth_error(status: StatusCode, body: &str) -> AppError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| format!("{} {}", status, body.trim()));

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::AuthError(message)
        }
        StatusCode::FORBIDDEN => AppError::PermissionDenied(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        _ => AppError::ExternalApiError(format!("auth API returned {}: {}", status, message)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub fn classify_storage_error(status: StatusCode, body: &str) -> AppError {
    let parsed: StorageErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| format!("{} {}", status, body.trim()));

    if message.contains("row-level security") {
        return AppError::PermissionDenied(message);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::PermissionDenied(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::ConstraintViolation {
            code: "409".to_string(),
            message,
        },
        _ => AppError::ExternalApiError(format!("storage API returned {}: {}", status, message)),
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}
