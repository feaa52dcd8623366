// Annotation reader
// Parses the info file and pulls labels one by one from the data file

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::error::{CodecError, CodecResult};
use super::format::{data_path, info_path, DataFormat, DEFAULT_VERSION, VERSION_V3};
use super::markup::Element;
use crate::annotation::{
    ClassTable, ContinuousLabel, DiscreteLabel, FreeLabel, Label, Scheme, SchemeType,
};

struct ReadSession {
    info_path: PathBuf,
    data: Option<BufReader<File>>,
    scheme: Scheme,
    format: DataFormat,
    version: u32,
    len: usize,
    meta: BTreeMap<String, String>,
    position: usize,
    current: Option<Label>,
    line: String,
}

/// Pull reader for the info/data file pair
#[derive(Default)]
pub struct AnnotationReader {
    session: Option<ReadSession>,
}

/// Header of an info file: everything but the labels
pub(crate) struct InfoHeader {
    pub version: u32,
    pub format: DataFormat,
    pub len: usize,
    pub meta: BTreeMap<String, String>,
    pub scheme: Scheme,
}

impl AnnotationReader {
    pub fn new() -> Self {
        AnnotationReader::default()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Parse the info file and open the data file if it declares labels
    pub fn open(&mut self, path: impl AsRef<Path>) -> CodecResult<()> {
        if self.session.is_some() {
            log::warn!("annotation file already open");
            return Err(CodecError::AlreadyOpen);
        }

        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            log::warn!("'{}' is not a valid path", path.display());
            return Err(CodecError::InvalidPath(path.display().to_string()));
        }

        let info_path = info_path(path);
        log::debug!("open annotation file '{}'", info_path.display());
        let header = read_info(&info_path)?;

        let data = if header.len > 0 {
            let data_path = data_path(&info_path);
            let file = File::open(&data_path).map_err(|e| {
                log::warn!("could not open data file '{}'", data_path.display());
                e
            })?;
            Some(BufReader::new(file))
        } else {
            None
        };

        self.session = Some(ReadSession {
            info_path,
            data,
            scheme: header.scheme,
            format: header.format,
            version: header.version,
            len: header.len,
            meta: header.meta,
            position: 0,
            current: None,
            line: String::new(),
        });
        Ok(())
    }

    /// Release both files
    pub fn close(&mut self) -> CodecResult<()> {
        match self.session.take() {
            Some(session) => {
                log::debug!("close annotation file '{}'", session.info_path.display());
                Ok(())
            }
            None => Err(CodecError::NotOpen),
        }
    }

    pub fn scheme(&self) -> Option<&Scheme> {
        self.session.as_ref().map(|s| &s.scheme)
    }

    /// Number of labels declared in the info file
    pub fn len(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_format(&self) -> Option<DataFormat> {
        self.session.as_ref().map(|s| s.format)
    }

    pub fn version(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.version)
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.meta.get(key))
            .map(String::as_str)
    }

    pub fn meta_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.session
            .iter()
            .flat_map(|s| s.meta.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Next label, or `None` past the declared count or on malformed data.
    /// The label is owned by the reader and replaced by the following call.
    pub fn next(&mut self) -> Option<&Label> {
        match self.try_next() {
            Ok(label) => label,
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }

    /// Like [`AnnotationReader::next`] but reports why no label was read
    pub fn try_next(&mut self) -> CodecResult<Option<&Label>> {
        let session = self.session.as_mut().ok_or(CodecError::NotOpen)?;
        if session.position >= session.len {
            return Ok(None);
        }

        let index = session.position;
        session.position += 1;

        let scheme_type = session.scheme.scheme_type();
        let data = session.data.as_mut().ok_or(CodecError::NotOpen)?;
        let label = match session.format {
            DataFormat::Ascii => read_ascii(data, &mut session.line, scheme_type),
            DataFormat::Binary => read_binary(data, scheme_type),
        }
        .map_err(|reason| CodecError::MalformedRecord { index, reason })?;

        session.current = Some(label);
        Ok(session.current.as_ref())
    }

    /// Label at `index`, read from the start of the data file
    pub fn get(&mut self, index: usize) -> Option<&Label> {
        self.reset();
        for _ in 0..index {
            self.next()?;
        }
        self.next()
    }

    /// Rewind to the first label without parsing the info file again
    pub fn reset(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if let Some(data) = session.data.as_mut() {
                if let Err(e) = data.seek(SeekFrom::Start(0)) {
                    log::warn!("could not rewind data file: {}", e);
                }
            }
            session.position = 0;
            session.current = None;
        }
    }
}

/// Parse an info file into its header
pub(crate) fn read_info(info_path: &Path) -> CodecResult<InfoHeader> {
    let root = Element::load(info_path).map_err(|e| {
        log::warn!("failed loading annotation from file '{}'", info_path.display());
        e
    })?;

    if root.tag != "annotation" {
        log::warn!("tag <annotation> missing");
        return Err(CodecError::MissingElement("annotation".to_string()));
    }

    let version = match root.attribute("ssi-v") {
        Some(_) => root.parse_attribute::<u32>("ssi-v")?,
        None => DEFAULT_VERSION,
    };
    if version < VERSION_V3 {
        log::warn!("version < V3 not supported");
        return Err(CodecError::UnsupportedVersion(version));
    }

    let mut format = DataFormat::Ascii;
    let mut len = 0;
    if let Some(info) = root.first_child("info") {
        let name = info.require_attribute("ftype")?;
        format = DataFormat::from_name(name).ok_or_else(|| {
            log::warn!("attribute <ftype> has invalid value '{}' in tag <info>", name);
            CodecError::UnknownDataFormat(name.to_string())
        })?;
        len = info.parse_attribute("size")?;
    }

    let meta = root
        .first_child("meta")
        .map(|m| m.attributes.iter().cloned().collect())
        .unwrap_or_default();

    let scheme = root.first_child("scheme").ok_or_else(|| {
        log::warn!("tag <scheme> missing");
        CodecError::MissingElement("scheme".to_string())
    })?;

    Ok(InfoHeader {
        version,
        format,
        len,
        meta,
        scheme: parse_scheme(scheme)?,
    })
}

fn parse_scheme(element: &Element) -> CodecResult<Scheme> {
    let name = element.require_attribute("name")?;
    let type_name = element.require_attribute("type")?;
    let scheme_type = SchemeType::from_name(type_name).ok_or_else(|| {
        log::warn!("unknown scheme type '{}'", type_name);
        CodecError::UnknownSchemeType(type_name.to_string())
    })?;

    match scheme_type {
        SchemeType::Discrete => {
            let items: Vec<&Element> = element.children("item").collect();
            if items.is_empty() {
                log::warn!("tag <item> missing in <scheme>");
                return Err(CodecError::MissingElement("item".to_string()));
            }

            let mut pairs = Vec::with_capacity(items.len());
            for item in items {
                let class_name = item.require_attribute("name")?;
                let id: i32 = item.parse_attribute("id")?;
                pairs.push((class_name.to_string(), id));
            }
            Ok(Scheme::discrete(name, ClassTable::from_pairs(pairs)?))
        }
        SchemeType::Continuous => {
            let sample_rate: f64 = element.parse_attribute("sr")?;
            let min_score: f32 = element.parse_attribute("min")?;
            let max_score: f32 = element.parse_attribute("max")?;
            Ok(Scheme::continuous(name, sample_rate, min_score, max_score)?)
        }
        SchemeType::Free => Ok(Scheme::free(name)),
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, String> {
    field
        .trim()
        .parse()
        .map_err(|_| format!("invalid <{}> '{}'", what, field))
}

fn read_ascii<R: BufRead>(
    data: &mut R,
    line: &mut String,
    scheme_type: SchemeType,
) -> Result<Label, String> {
    line.clear();
    let n = data.read_line(line).map_err(|e| e.to_string())?;
    if n == 0 {
        return Err("unexpected end of data file".to_string());
    }
    let record = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = record.split(';').collect();

    match scheme_type {
        SchemeType::Discrete => {
            let [from, to, id, conf] = fields[..] else {
                return Err("could not read <from> <to> <id> <conf>".to_string());
            };
            Ok(Label::Discrete(DiscreteLabel {
                from: parse_field(from, "from")?,
                to: parse_field(to, "to")?,
                class_id: parse_field(id, "id")?,
                confidence: parse_field(conf, "conf")?,
            }))
        }
        SchemeType::Continuous => {
            let [score, conf] = fields[..] else {
                return Err("could not read <score> <conf>".to_string());
            };
            Ok(Label::Continuous(ContinuousLabel {
                score: parse_field(score, "score")?,
                confidence: parse_field(conf, "conf")?,
            }))
        }
        SchemeType::Free => {
            // Names may contain the separator, so the name is everything between
            // the second and the last field
            if fields.len() < 4 {
                return Err("could not read <from> <to> <name> <conf>".to_string());
            }
            let last = fields.len() - 1;
            Ok(Label::Free(FreeLabel {
                from: parse_field(fields[0], "from")?,
                to: parse_field(fields[1], "to")?,
                name: fields[2..last].join(";"),
                confidence: parse_field(fields[last], "conf")?,
            }))
        }
    }
}

fn read_array<R: Read, const N: usize>(data: &mut R, what: &str) -> Result<[u8; N], String> {
    let mut buf = [0u8; N];
    data.read_exact(&mut buf)
        .map_err(|_| format!("could not read <{}>", what))?;
    Ok(buf)
}

fn read_binary<R: Read>(data: &mut R, scheme_type: SchemeType) -> Result<Label, String> {
    match scheme_type {
        SchemeType::Discrete => Ok(Label::Discrete(DiscreteLabel {
            from: f64::from_le_bytes(read_array(data, "from")?),
            to: f64::from_le_bytes(read_array(data, "to")?),
            class_id: i32::from_le_bytes(read_array(data, "id")?),
            confidence: f32::from_le_bytes(read_array(data, "confidence")?),
        })),
        SchemeType::Continuous => Ok(Label::Continuous(ContinuousLabel {
            score: f32::from_le_bytes(read_array(data, "score")?),
            confidence: f32::from_le_bytes(read_array(data, "confidence")?),
        })),
        SchemeType::Free => {
            let from = f64::from_le_bytes(read_array(data, "from")?);
            let to = f64::from_le_bytes(read_array(data, "to")?);
            let n_name = u32::from_le_bytes(read_array(data, "n_name")?) as u64;
            // The length prefix is untrusted, read at most what is there
            let mut name = Vec::new();
            let n_read = data
                .by_ref()
                .take(n_name)
                .read_to_end(&mut name)
                .map_err(|_| "could not read <name>".to_string())?;
            if n_read as u64 != n_name {
                return Err(format!("could not read <name>, {} of {} bytes", n_read, n_name));
            }
            Ok(Label::Free(FreeLabel {
                from,
                to,
                name: String::from_utf8_lossy(&name).into_owned(),
                confidence: f32::from_le_bytes(read_array(data, "confidence")?),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_info(dir: &Path, name: &str, xml: &str) -> PathBuf {
        let path = dir.join(format!("{}.annotation", name));
        std::fs::write(&path, xml).unwrap();
        path
    }

    #[test]
    fn test_read_ascii_free_name_with_separator() {
        let mut data = Cursor::new(b"0.5;1.5;a;b;c;0.25\r\n".to_vec());
        let mut line = String::new();

        let label = read_ascii(&mut data, &mut line, SchemeType::Free).unwrap();

        assert_eq!(
            label,
            Label::Free(FreeLabel {
                from: 0.5,
                to: 1.5,
                name: "a;b;c".to_string(),
                confidence: 0.25,
            })
        );
        assert!(read_ascii(&mut data, &mut line, SchemeType::Free).is_err());
    }

    #[test]
    fn test_read_ascii_rejects_bad_records() {
        let mut line = String::new();
        let mut short = Cursor::new(b"0;1;2\n".to_vec());
        assert!(read_ascii(&mut short, &mut line, SchemeType::Discrete).is_err());

        let mut garbage = Cursor::new(b"x;1\n".to_vec());
        assert!(read_ascii(&mut garbage, &mut line, SchemeType::Continuous).is_err());
    }

    #[test]
    fn test_read_binary_truncated() {
        let mut data = Cursor::new(vec![0u8; 10]);
        assert!(read_binary(&mut data, SchemeType::Discrete).is_err());
    }

    #[test]
    fn test_read_binary_oversized_name_length() {
        let mut record = Vec::new();
        record.extend_from_slice(&0.0f64.to_le_bytes());
        record.extend_from_slice(&1.0f64.to_le_bytes());
        record.extend_from_slice(&u32::MAX.to_le_bytes());
        record.extend_from_slice(b"abc");
        let mut data = Cursor::new(record);

        let err = read_binary(&mut data, SchemeType::Free).unwrap_err();
        assert!(err.contains("3 of 4294967295"));
    }

    #[test]
    fn test_rejects_old_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_info(
            dir.path(),
            "old",
            "<?xml version=\"1.0\" ?>\n<annotation ssi-v=\"2\">\n\t<scheme name=\"x\" type=\"FREE\" />\n</annotation>\n",
        );

        let mut reader = AnnotationReader::new();
        assert!(matches!(
            reader.open(&path),
            Err(CodecError::UnsupportedVersion(2))
        ));
        assert!(!reader.is_open());
    }

    #[test]
    fn test_scheme_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = AnnotationReader::new();

        let no_items = write_info(
            dir.path(),
            "no_items",
            "<annotation ssi-v=\"3\"><scheme name=\"x\" type=\"DISCRETE\"></scheme></annotation>",
        );
        assert!(matches!(
            reader.open(&no_items),
            Err(CodecError::MissingElement(_))
        ));

        let no_sr = write_info(
            dir.path(),
            "no_sr",
            "<annotation ssi-v=\"3\"><scheme name=\"x\" type=\"CONTINUOUS\" min=\"0\" max=\"1\" /></annotation>",
        );
        assert!(matches!(
            reader.open(&no_sr),
            Err(CodecError::MissingAttribute { .. })
        ));

        let bad_type = write_info(
            dir.path(),
            "bad_type",
            "<annotation ssi-v=\"3\"><scheme name=\"x\" type=\"SPARSE\" /></annotation>",
        );
        assert!(matches!(
            reader.open(&bad_type),
            Err(CodecError::UnknownSchemeType(_))
        ));

        let no_scheme = write_info(dir.path(), "no_scheme", "<annotation ssi-v=\"3\" />");
        assert!(matches!(
            reader.open(&no_scheme),
            Err(CodecError::MissingElement(_))
        ));
    }

    #[test]
    fn test_scheme_type_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_info(
            dir.path(),
            "lower",
            "<annotation ssi-v=\"3\"><scheme name=\"arousal\" type=\"continuous\" sr=\"25\" min=\"0\" max=\"1\" /></annotation>",
        );

        let mut reader = AnnotationReader::new();
        reader.open(&path).unwrap();

        assert_eq!(reader.scheme().unwrap().sample_rate(), Some(25.0));
        assert_eq!(reader.len(), 0);
        assert!(reader.next().is_none());
        reader.close().unwrap();
        assert!(matches!(reader.close(), Err(CodecError::NotOpen)));
    }
}
