// Annotation errors
// Scheme mismatches and validation failures raised by annotation operations

use thiserror::Error;

use super::types::SchemeType;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("annotation has no scheme")]
    NoScheme,

    #[error("type mismatch '{expected} != {actual}'")]
    SchemeMismatch {
        expected: SchemeType,
        actual: SchemeType,
    },

    #[error("type not supported '{0}'")]
    UnsupportedScheme(SchemeType),

    #[error("label of type '{label}' does not fit scheme of type '{scheme}'")]
    LabelMismatch {
        label: SchemeType,
        scheme: SchemeType,
    },

    #[error("unknown class id '{0}'")]
    UnknownClassId(i32),

    #[error("invalid class name '{0}'")]
    UnknownClassName(String),

    #[error("class name already exists '{0}'")]
    DuplicateClassName(String),

    #[error("already has a class with id '{0}'")]
    DuplicateClassId(i32),

    #[error("class name '{0}' is reserved")]
    ReservedClassName(String),

    #[error("class ids must be non-negative, got '{0}'")]
    NegativeClassId(i32),

    #[error("empty class name")]
    EmptyClassName,

    #[error("invalid sample rate '{0}'")]
    InvalidSampleRate(f64),

    #[error("invalid frame duration '{0}'")]
    InvalidFrameDuration(f64),

    #[error("new annotation has zero length")]
    ZeroLength,

    #[error("invalid stream dimension '{dim} >= {stream_dim}'")]
    InvalidDimension { dim: usize, stream_dim: usize },

    #[error("invalid meta key '{0}'")]
    InvalidMetaKey(String),

    #[error("stream is not of type float")]
    NotFloatStream,

    #[error("empty label name")]
    EmptyLabelName,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid column '{column}', table has {columns} columns")]
    InvalidColumn { column: String, columns: usize },

    #[error("csv header is missing")]
    MissingHeader,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type AnnotationResult<T> = Result<T, AnnotationError>;
