use thiserror::Error;

/// Top-level error type for sqleval.
///
/// Binding and semantic errors are detected before any row is processed;
/// type errors may surface per row but abort the whole evaluation. The
/// `ERROR: ...` message wording is part of the output contract: evaluation
/// failures are written verbatim to the output file.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("ERROR: Unknown table name \"{0}\".")]
    TableNotFound(String),

    #[error("ERROR: Column reference \"{0}\" does not exist.")]
    UnknownColumn(String),

    #[error("ERROR: Column reference \"{column}\" is ambiguous; present in multiple tables: {tables}.")]
    AmbiguousColumn { column: String, tables: String },

    #[error("ERROR: Incompatible types to \"{op}\": {left} and {right}.")]
    Type {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("ERROR: Incompatible type to \"{op}\": {operand}.")]
    UnaryType { op: String, operand: &'static str },

    #[error("ERROR: {0}")]
    Semantic(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl Error {
    /// Whether this error belongs in the output file rather than stderr.
    /// Evaluation errors are part of the query's result; I/O and
    /// document-shape failures are not.
    pub fn is_evaluation_error(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
