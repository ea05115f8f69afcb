use thiserror::Error;

/// Errors raised by proxy construction, component lookup, registration and reconstruction.
///
/// Failures of the operations being routed are not represented here: override and host
/// errors travel through [`crate::dispatch::dispatch`] untouched as [`anyhow::Error`].
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("source component '{key}' is not present in the component mapping")]
    MissingSource { key: String },
    #[error("{type_name} object has no attribute '{name}'")]
    UnknownAttribute {
        type_name: &'static str,
        name: String,
    },
    #[error("an override is already registered for operation '{op}'")]
    DuplicateOverride { op: &'static str },
    #[error("type '{type_name}' is not allow-listed for reconstruction")]
    UnsafeType { type_name: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
