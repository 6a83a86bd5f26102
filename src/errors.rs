/// Errors produced by cookie backends and the cookie state primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("No cookie backend available in this environment")]
    BackendUnavailable,

    #[error("Cookie store operation failed: {0}")]
    StoreOperationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cookie state has been disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, CookieError>;
