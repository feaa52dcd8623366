// Annotation Engine - Time-aligned labels for multimodal sensor recordings
// Module declarations

pub mod annotation;
pub mod audio;
pub mod codec;
pub mod config;
pub mod samples;

pub use annotation::{Annotation, AnnotationError, FrameSettings, Label, Scheme, SchemeType};
pub use codec::{AnnotationReader, AnnotationWriter, CodecError, DataFormat};
pub use config::{ConfigError, EngineConfig};
pub use samples::{ExtractError, ExtractSettings, Sample, SampleList, Stream};
