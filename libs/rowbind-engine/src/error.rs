use rowbind_api::error::{BoxError, CoercionError};

/// Plan-build failure. Fatal for the plan key: cached and handed to every
/// later caller until the type's metadata is fixed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("{type_name}: parameter '{parameter}' is claimed by both '{first}' and '{second}'")]
    AmbiguousDeserializer {
        type_name: &'static str,
        parameter: String,
        first: String,
        second: String,
    },

    #[error("{type_name}: no construction strategy: {reason}")]
    NoConstructionStrategy {
        type_name: &'static str,
        reason: String,
    },

    #[error("{type_name}: parameter '{parameter}' has unsupported type {declared}")]
    UnsupportedType {
        type_name: &'static str,
        parameter: String,
        declared: &'static str,
    },

    #[error(
        "{type_name}: column '{column}' is read as {first_source} by '{first}' and as {second_source} by '{second}'"
    )]
    ConflictingBinding {
        type_name: &'static str,
        column: String,
        first: String,
        first_source: &'static str,
        second: String,
        second_source: &'static str,
    },

    #[error(
        "{type_name}: deserializer '{deserializer}' produces {produced} but parameter '{parameter}' is {expected}"
    )]
    DeserializerMismatch {
        type_name: &'static str,
        parameter: String,
        deserializer: String,
        produced: &'static str,
        expected: &'static str,
    },

    #[error("{type_name}: recursive type reference through {path}")]
    RecursiveType {
        type_name: &'static str,
        path: String,
    },
}

impl ResolveError {
    pub fn no_strategy(type_name: &'static str, reason: impl Into<String>) -> Self {
        ResolveError::NoConstructionStrategy {
            type_name,
            reason: reason.into(),
        }
    }
}

/// Per-row binding failure. Never affects the cached plan or other rows.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("plan resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("missing column '{column}'")]
    MissingColumn { column: String },

    #[error("column '{column}' is null but its parameter is not nullable")]
    NullNotAllowed { column: String },

    #[error("column '{column}': {source}")]
    Coercion {
        column: String,
        source: CoercionError,
    },

    #[error("failed to construct {type_name}: {source}")]
    Construction {
        type_name: &'static str,
        source: BoxError,
    },
}

impl BindError {
    /// Column the failure is attributed to, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            BindError::MissingColumn { column }
            | BindError::NullNotAllowed { column }
            | BindError::Coercion { column, .. } => Some(column),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config read ({path}): {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
}
