// Annotation file codec
// Info/data file pair: markup tree, data encodings, writer and pull reader

pub mod error;
pub mod format;
pub mod markup;
pub mod reader;
pub mod writer;

pub use error::{CodecError, CodecResult};
pub use format::{data_path, info_path, DataFormat, DEFAULT_VERSION, VERSION_V3};
pub use markup::Element;
pub use reader::AnnotationReader;
pub use writer::{AnnotationWriter, WriterSettings};

use std::path::Path;

use crate::annotation::{Annotation, AnnotationError};

impl Annotation {
    /// Write the annotation to `<path>.annotation` and `<path>.annotation~`
    pub fn save(&self, path: impl AsRef<Path>, format: DataFormat) -> CodecResult<()> {
        self.save_with(
            path,
            &WriterSettings {
                data_format: format,
                ..Default::default()
            },
        )
    }

    pub fn save_with(&self, path: impl AsRef<Path>, settings: &WriterSettings) -> CodecResult<()> {
        let scheme = self.scheme().ok_or(AnnotationError::NoScheme)?;

        let mut writer = AnnotationWriter::new();
        writer.open_with(path, scheme, settings)?;
        writer.write_all(self)?;
        for (key, value) in self.meta_iter() {
            writer.write_meta(key, value)?;
        }
        writer.close()
    }

    /// Replace this annotation with the contents of a file pair
    pub fn load(&mut self, path: impl AsRef<Path>) -> CodecResult<()> {
        self.release();

        let mut reader = AnnotationReader::new();
        reader.open(path)?;
        if let Some(scheme) = reader.scheme() {
            self.set_scheme(scheme.clone());
        }

        // Labels the scheme rejects are skipped, malformed records abort
        while let Some(label) = reader.try_next()? {
            if let Err(e) = self.add_label(label.clone()) {
                log::warn!("skip label: {}", e);
            }
        }

        let meta: Vec<(String, String)> = reader
            .meta_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, value) in meta {
            if let Err(e) = self.set_meta(key, value) {
                log::warn!("skip meta: {}", e);
            }
        }

        reader.close()
    }

    /// Read an annotation from a file pair
    pub fn from_file(path: impl AsRef<Path>) -> CodecResult<Annotation> {
        let mut annotation = Annotation::new();
        annotation.load(path)?;
        Ok(annotation)
    }

    /// Replace this annotation with an empty one using the scheme of a file pair
    pub fn load_scheme(&mut self, path: impl AsRef<Path>) -> CodecResult<()> {
        self.release();

        let header = reader::read_info(&info_path(path))?;
        self.set_scheme(header.scheme);
        Ok(())
    }
}
