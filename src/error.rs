use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Type '{type_name}' is registered more than once")]
    DuplicateType { type_name: String },

    #[error("Field '{type_name}.{field}' is declared more than once")]
    DuplicateField { type_name: String, field: String },

    #[error("Type '{referenced}' referenced by '{referrer}' is not registered")]
    UnknownType { referrer: String, referenced: String },

    #[error("Root type '{type_name}' is not registered")]
    MissingRootType { type_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} with key '{key}' already exists")]
    Conflict { entity: &'static str, key: String },

    #[error("{entity} references missing {target} '{key}'")]
    ForeignKey {
        entity: &'static str,
        target: &'static str,
        key: String,
    },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

/// Failure of a single field. Isolated to its node in the result tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("Unknown field '{field}' on type '{type_name}'")]
    UnknownField { type_name: String, field: String },

    #[error("Unknown argument '{argument}'")]
    UnknownArgument { argument: String },

    #[error("Argument '{argument}' expected {expected}, found {found}")]
    ArgumentTypeMismatch {
        argument: String,
        expected: String,
        found: String,
    },

    #[error("{entity} '{key}' not found")]
    NotFound { entity: String, key: String },

    #[error("Batch fetch for loader '{loader}' failed: {message}")]
    BatchFetchFailure { loader: String, message: String },

    #[error("Loader '{loader}' was registered with different key or value types")]
    LoaderTypeMismatch { loader: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Resolver(String),

    #[error("Request cancelled")]
    RequestCancelled,
}

impl ResolveError {
    pub fn resolver(message: impl Into<String>) -> Self {
        Self::Resolver(message.into())
    }

    pub fn not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Machine readable code placed under `extensions.code` in responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::UnknownArgument { .. } => "UNKNOWN_ARGUMENT",
            Self::ArgumentTypeMismatch { .. } => "ARGUMENT_TYPE_MISMATCH",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BatchFetchFailure { .. } => "BATCH_FETCH_FAILURE",
            Self::LoaderTypeMismatch { .. } => "INTERNAL",
            Self::Store(_) => "STORE_ERROR",
            Self::Resolver(_) => "RESOLVER_ERROR",
            Self::RequestCancelled => "REQUEST_CANCELLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("Failed to parse query: {message}")]
    Parse { message: String },

    #[error("Unknown operation named '{name}'")]
    UnknownOperation { name: String },

    #[error("Operation name is required when the document contains several operations")]
    OperationNameRequired,

    #[error("Subscriptions are not supported")]
    UnsupportedOperation,

    #[error("Unknown fragment '{name}'")]
    UnknownFragment { name: String },

    #[error("Fragment '{name}' spreads itself")]
    FragmentCycle { name: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "PARSE_ERROR",
            Self::UnknownOperation { .. } | Self::OperationNameRequired => "UNKNOWN_OPERATION",
            Self::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Self::UnknownFragment { .. } => "UNKNOWN_FRAGMENT",
            Self::FragmentCycle { .. } => "FRAGMENT_CYCLE",
            Self::Cancelled | Self::Timeout { .. } => "REQUEST_CANCELLED",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
