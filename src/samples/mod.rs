// Samples module
// Raw streams, the sample registry and extraction of training samples from annotations

pub mod extract;
pub mod list;
pub mod stream;

pub use extract::{ExtractError, ExtractResult, ExtractSettings};
pub use list::{Sample, SampleList};
pub use stream::{SampleType, Stream};
