// Codec errors
// I/O, markup and format failures of annotation file sessions

use thiserror::Error;

use crate::annotation::AnnotationError;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("markup error: {0}")]
    Markup(#[from] quick_xml::Error),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error("malformed annotation file: {0}")]
    Malformed(String),

    #[error("'{0}' is not a valid path")]
    InvalidPath(String),

    #[error("annotation file already open")]
    AlreadyOpen,

    #[error("annotation file not open")]
    NotOpen,

    #[error("version '{0}' not supported, need at least 3")]
    UnsupportedVersion(u32),

    #[error("tag <{0}> missing")]
    MissingElement(String),

    #[error("attribute <{attribute}> missing in <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("attribute <{attribute}> has invalid value '{value}' in <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("unknown scheme type '{0}'")]
    UnknownSchemeType(String),

    #[error("unknown file type '{0}'")]
    UnknownDataFormat(String),

    #[error("could not read label {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

pub type CodecResult<T> = Result<T, CodecError>;
