// Annotation module
// Scheme and label model, segment algebra, frame discretizer, stream and CSV import

pub mod csv;
pub mod error;
pub mod frames;
pub mod import;
pub mod model;
pub mod segments;
pub mod types;

pub use csv::{CsvColumn, CsvConfidence, CsvTable};
pub use error::{AnnotationError, AnnotationResult};
pub use frames::FrameSettings;
pub use model::Annotation;
pub use segments::{FilterOperator, FilterProperty};
pub use types::{
    ClassEntry, ClassTable, ContinuousLabel, DiscreteLabel, FreeLabel, Label, Labels, Scheme,
    is_meta_key, SchemeKind, SchemeType, Segment, GARBAGE_CLASS_ID, GARBAGE_CLASS_NAME,
    GARBAGE_USER_NAME, REST_CLASS_NAME,
};
