//! Error types for riskserve

/// Result type alias using riskserve's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for riskserve operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Artifact could not be turned into a model handle
    #[error("load error: {0}")]
    Load(String),

    /// No model registered under the requested name
    #[error("model '{name}' not found")]
    UnknownModel { name: String },

    /// Required column(s) absent from the input table
    #[error("{message}")]
    SchemaMismatch {
        message: String,
        /// Sorted names of the absent columns (may be empty)
        missing: Vec<String>,
    },

    /// Fewer rows than the model's window requires
    #[error("input must contain at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Predictor invocation or feature scaling failed
    #[error("prediction failed: {0}")]
    Inference(String),

    /// Input table is structurally malformed
    #[error("invalid table: {0}")]
    InvalidTable(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new load error
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a new unknown-model error
    pub fn unknown_model(name: impl Into<String>) -> Self {
        Self::UnknownModel { name: name.into() }
    }

    /// Create a schema mismatch listing the absent columns, sorted and deduplicated
    pub fn missing_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut missing: Vec<String> = columns.into_iter().map(Into::into).collect();
        missing.sort();
        missing.dedup();
        Self::SchemaMismatch {
            message: format!("missing columns: {:?}", missing),
            missing,
        }
    }

    /// Create a schema mismatch that is not about specific absent columns
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: msg.into(),
            missing: Vec::new(),
        }
    }

    /// Create a new insufficient-data error
    pub fn insufficient_data(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid-table error
    pub fn invalid_table(msg: impl Into<String>) -> Self {
        Self::InvalidTable(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short, stable name of the error kind (used for metrics labels and
    /// error bodies at the transport boundary)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load(_) => "load_error",
            Self::UnknownModel { .. } => "unknown_model",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Inference(_) => "inference_error",
            Self::InvalidTable(_) => "invalid_table",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
