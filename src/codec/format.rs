// Annotation file format
// Data encodings, format versions and the info/data path pair

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Oldest and only supported version of the file pair
pub const VERSION_V3: u32 = 3;

/// Version assumed when the root element carries none
pub const DEFAULT_VERSION: u32 = VERSION_V3;

/// Extension of the info file
pub const INFO_EXTENSION: &str = "annotation";

/// Suffix appended to the info path to name the data file
pub const DATA_SUFFIX: &str = "~";

/// Encoding of the data file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataFormat {
    /// One `;`-separated line per label
    #[default]
    Ascii,

    /// Packed little-endian records
    Binary,
}

impl DataFormat {
    /// Name used in the info file
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Ascii => "ASCII",
            DataFormat::Binary => "BINARY",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCII" => Some(DataFormat::Ascii),
            "BINARY" => Some(DataFormat::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Info file path: `.annotation` is appended unless already present
pub fn info_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.extension().is_some_and(|ext| ext == INFO_EXTENSION) {
        path.to_path_buf()
    } else {
        let mut name = OsString::from(path.as_os_str());
        name.push(".");
        name.push(INFO_EXTENSION);
        PathBuf::from(name)
    }
}

/// Data file path belonging to an info file path
pub fn data_path(info_path: impl AsRef<Path>) -> PathBuf {
    let mut name = OsString::from(info_path.as_ref().as_os_str());
    name.push(DATA_SUFFIX);
    PathBuf::from(name)
}
