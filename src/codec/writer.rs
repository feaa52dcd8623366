// Annotation writer
// Streams labels into the data file and commits the info file footer on close

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::{CodecError, CodecResult};
use super::format::{data_path, info_path, DataFormat, VERSION_V3};
use super::markup::Element;
use crate::annotation::{is_meta_key, Annotation, AnnotationError, Label, Scheme, SchemeKind};

/// Settings for writing annotation files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    /// Encoding of the data file
    pub data_format: DataFormat,

    /// Version written to the info file
    pub version: u32,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            data_format: DataFormat::Ascii,
            version: VERSION_V3,
        }
    }
}

struct WriteSession {
    info_path: PathBuf,
    info: BufWriter<File>,
    data: BufWriter<File>,
    scheme: Scheme,
    format: DataFormat,
    count: usize,
    meta: BTreeMap<String, String>,
}

/// Writer for the info/data file pair.
///
/// The info file only receives its prolog on open. Label count, metadata
/// and scheme are written when the writer is closed, so an interrupted
/// session leaves an info file that cannot be read back.
#[derive(Default)]
pub struct AnnotationWriter {
    session: Option<WriteSession>,
}

impl AnnotationWriter {
    pub fn new() -> Self {
        AnnotationWriter::default()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Number of labels written in the current session
    pub fn len(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create the info and data files for `scheme`
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        scheme: &Scheme,
        format: DataFormat,
        version: u32,
    ) -> CodecResult<()> {
        if version < VERSION_V3 {
            log::warn!("version < V3 not supported");
            return Err(CodecError::UnsupportedVersion(version));
        }
        if self.session.is_some() {
            log::warn!("annotation already open");
            return Err(CodecError::AlreadyOpen);
        }

        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CodecError::InvalidPath(path.display().to_string()));
        }

        let info_path = info_path(path);
        let mut info = BufWriter::new(File::create(&info_path).map_err(|e| {
            log::warn!("could not open info file '{}'", info_path.display());
            e
        })?);
        writeln!(
            info,
            "<?xml version=\"1.0\" ?>\n<annotation ssi-v=\"{}\">",
            version
        )?;

        let data_path = data_path(&info_path);
        let data = BufWriter::new(File::create(&data_path).map_err(|e| {
            log::warn!("could not open data file '{}'", data_path.display());
            e
        })?);

        log::debug!("open annotation file '{}'", info_path.display());
        self.session = Some(WriteSession {
            info_path,
            info,
            data,
            scheme: scheme.clone(),
            format,
            count: 0,
            meta: BTreeMap::new(),
        });
        Ok(())
    }

    /// Open with the format and version from `settings`
    pub fn open_with(
        &mut self,
        path: impl AsRef<Path>,
        scheme: &Scheme,
        settings: &WriterSettings,
    ) -> CodecResult<()> {
        self.open(path, scheme, settings.data_format, settings.version)
    }

    /// Append one label to the data file
    pub fn write(&mut self, label: &Label) -> CodecResult<()> {
        let session = self.session.as_mut().ok_or_else(|| {
            log::warn!("file not open");
            CodecError::NotOpen
        })?;

        let scheme_type = session.scheme.scheme_type();
        if label.scheme_type() != scheme_type {
            return Err(AnnotationError::LabelMismatch {
                label: label.scheme_type(),
                scheme: scheme_type,
            }
            .into());
        }

        match session.format {
            DataFormat::Ascii => write_ascii(&mut session.data, label)?,
            DataFormat::Binary => write_binary(&mut session.data, label)?,
        }
        session.count += 1;
        Ok(())
    }

    /// Append every label of an annotation
    pub fn write_all(&mut self, annotation: &Annotation) -> CodecResult<()> {
        if self.session.is_none() {
            log::warn!("file not open");
            return Err(CodecError::NotOpen);
        }
        for label in annotation.labels().iter() {
            self.write(&label)?;
        }
        Ok(())
    }

    /// Store a metadata entry for the footer
    pub fn write_meta(&mut self, key: impl Into<String>, value: impl Into<String>) -> CodecResult<()> {
        let session = self.session.as_mut().ok_or(CodecError::NotOpen)?;
        let key = key.into();
        if !is_meta_key(&key) {
            log::warn!("invalid meta key '{}'", key);
            return Err(AnnotationError::InvalidMetaKey(key).into());
        }
        session.meta.insert(key, value.into());
        Ok(())
    }

    /// Finish the data file, then write info, meta and scheme to the info file
    pub fn close(&mut self) -> CodecResult<()> {
        let Some(mut session) = self.session.take() else {
            log::warn!("file not open");
            return Err(CodecError::NotOpen);
        };

        log::debug!("close annotation file '{}'", session.info_path.display());
        session.data.flush()?;

        let mut footer = Vec::new();
        if session.count > 0 {
            footer.push(
                Element::new("info")
                    .with_attribute("ftype", session.format)
                    .with_attribute("size", session.count),
            );
        }
        if !session.meta.is_empty() {
            let mut meta = Element::new("meta");
            for (key, value) in &session.meta {
                meta.set_attribute(key.as_str(), value);
            }
            footer.push(meta);
        }
        footer.push(scheme_element(&session.scheme));

        let body: Vec<String> = footer.iter().map(|e| e.render(1)).collect();
        writeln!(session.info, "{}\n</annotation>", body.join("\n"))?;
        session.info.flush()?;
        Ok(())
    }
}

impl Drop for AnnotationWriter {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.close() {
                log::error!("failed to close annotation file: {}", e);
            }
        }
    }
}

/// `scheme` element of the info file
fn scheme_element(scheme: &Scheme) -> Element {
    let mut element = Element::new("scheme")
        .with_attribute("name", scheme.name())
        .with_attribute("type", scheme.scheme_type());

    match scheme.kind() {
        SchemeKind::Discrete(classes) => {
            for entry in classes {
                element.push_child(
                    Element::new("item")
                        .with_attribute("name", &entry.name)
                        .with_attribute("id", entry.id),
                );
            }
        }
        SchemeKind::Continuous {
            sample_rate,
            min_score,
            max_score,
        } => {
            element.set_attribute("sr", sample_rate);
            element.set_attribute("min", min_score);
            element.set_attribute("max", max_score);
        }
        SchemeKind::Free => {}
    }
    element
}

fn strip_line_breaks(name: &str) -> String {
    name.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

fn write_ascii<W: Write>(out: &mut W, label: &Label) -> std::io::Result<()> {
    match label {
        Label::Discrete(l) => writeln!(out, "{};{};{};{}", l.from, l.to, l.class_id, l.confidence),
        Label::Continuous(l) => writeln!(out, "{};{}", l.score, l.confidence),
        Label::Free(l) => writeln!(
            out,
            "{};{};{};{}",
            l.from,
            l.to,
            strip_line_breaks(&l.name),
            l.confidence
        ),
    }
}

fn write_binary<W: Write>(out: &mut W, label: &Label) -> std::io::Result<()> {
    match label {
        Label::Discrete(l) => {
            out.write_all(&l.from.to_le_bytes())?;
            out.write_all(&l.to.to_le_bytes())?;
            out.write_all(&l.class_id.to_le_bytes())?;
            out.write_all(&l.confidence.to_le_bytes())
        }
        Label::Continuous(l) => {
            out.write_all(&l.score.to_le_bytes())?;
            out.write_all(&l.confidence.to_le_bytes())
        }
        Label::Free(l) => {
            let name = strip_line_breaks(&l.name);
            out.write_all(&l.from.to_le_bytes())?;
            out.write_all(&l.to.to_le_bytes())?;
            out.write_all(&(name.len() as u32).to_le_bytes())?;
            out.write_all(name.as_bytes())?;
            out.write_all(&l.confidence.to_le_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ContinuousLabel, DiscreteLabel, FreeLabel};

    #[test]
    fn test_ascii_records() {
        let mut out = Vec::new();
        write_ascii(
            &mut out,
            &Label::Discrete(DiscreteLabel { from: 0.5, to: 1.25, class_id: -1, confidence: 0.75 }),
        )
        .unwrap();
        write_ascii(&mut out, &Label::Continuous(ContinuousLabel { score: 0.1, confidence: 1.0 }))
            .unwrap();
        write_ascii(
            &mut out,
            &Label::Free(FreeLabel {
                from: 2.0,
                to: 3.0,
                name: "two\r\nlines".to_string(),
                confidence: 1.0,
            }),
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "0.5;1.25;-1;0.75\n0.1;1\n2;3;twolines;1\n");
    }

    #[test]
    fn test_binary_record_sizes() {
        let mut discrete = Vec::new();
        write_binary(
            &mut discrete,
            &Label::Discrete(DiscreteLabel { from: 0.0, to: 1.0, class_id: 3, confidence: 1.0 }),
        )
        .unwrap();
        assert_eq!(discrete.len(), 8 + 8 + 4 + 4);
        assert_eq!(&discrete[16..20], &3i32.to_le_bytes());

        let mut free = Vec::new();
        write_binary(
            &mut free,
            &Label::Free(FreeLabel { from: 0.0, to: 1.0, name: "abc".to_string(), confidence: 1.0 }),
        )
        .unwrap();
        assert_eq!(free.len(), 8 + 8 + 4 + 3 + 4);
        assert_eq!(&free[16..20], &3u32.to_le_bytes());
        assert_eq!(&free[20..23], b"abc");
    }

    #[test]
    fn test_session_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        let scheme = Scheme::free("notes");
        let mut writer = AnnotationWriter::new();

        assert!(matches!(writer.close(), Err(CodecError::NotOpen)));
        assert!(matches!(
            writer.open(&path, &scheme, DataFormat::Ascii, 2),
            Err(CodecError::UnsupportedVersion(2))
        ));

        writer.open(&path, &scheme, DataFormat::Ascii, VERSION_V3).unwrap();
        assert!(matches!(
            writer.open(&path, &scheme, DataFormat::Ascii, VERSION_V3),
            Err(CodecError::AlreadyOpen)
        ));
        assert!(writer
            .write(&Label::Continuous(ContinuousLabel { score: 0.0, confidence: 1.0 }))
            .is_err());
        writer.close().unwrap();
        assert!(!writer.is_open());
    }

    #[test]
    fn test_footer_is_written_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        let scheme = Scheme::free("notes");
        let label = Label::Free(FreeLabel {
            from: 0.0,
            to: 1.0,
            name: "hello".to_string(),
            confidence: 1.0,
        });

        let mut writer = AnnotationWriter::new();
        writer.open(&path, &scheme, DataFormat::Ascii, VERSION_V3).unwrap();
        writer.write(&label).unwrap();
        writer.write_meta("annotator", "alice").unwrap();
        writer.flush_buffers();

        let info_file = dir.path().join("session.annotation");
        let before = std::fs::read_to_string(&info_file).unwrap();
        assert!(!before.contains("<scheme"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("session.annotation~")).unwrap(),
            "0;1;hello;1\n"
        );

        drop(writer);

        let after = std::fs::read_to_string(&info_file).unwrap();
        assert!(after.starts_with("<?xml version=\"1.0\" ?>\n<annotation ssi-v=\"3\">"));
        assert!(after.contains("<info ftype=\"ASCII\" size=\"1\" />"));
        assert!(after.contains("<meta annotator=\"alice\" />"));
        assert!(after.contains("<scheme name=\"notes\" type=\"FREE\" />"));
        assert!(after.trim_end().ends_with("</annotation>"));
    }

    #[test]
    fn test_invalid_meta_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");

        let mut writer = AnnotationWriter::new();
        writer
            .open(&path, &Scheme::free("notes"), DataFormat::Ascii, VERSION_V3)
            .unwrap();
        for key in ["annotator name", "", "1st", "a<b"] {
            assert!(matches!(
                writer.write_meta(key, "alice"),
                Err(CodecError::Annotation(AnnotationError::InvalidMetaKey(_)))
            ));
        }
        writer.write_meta("annotator_name", "alice").unwrap();
        writer.close().unwrap();

        let info = std::fs::read_to_string(dir.path().join("session.annotation")).unwrap();
        assert!(info.contains("<meta annotator_name=\"alice\" />"));
    }

    impl AnnotationWriter {
        fn flush_buffers(&mut self) {
            if let Some(session) = self.session.as_mut() {
                session.info.flush().unwrap();
                session.data.flush().unwrap();
            }
        }
    }
}
