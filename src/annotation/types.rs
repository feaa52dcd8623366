// Annotation scheme and label types
// Defines the three label schemes, the discrete class table and the label records

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{AnnotationError, AnnotationResult};

/// Reserved class id for unlabeled/background segments.
/// Any negative id is treated as garbage; this is the canonical one.
pub const GARBAGE_CLASS_ID: i32 = -1;

/// Reserved class name that always resolves to [`GARBAGE_CLASS_ID`]
pub const GARBAGE_CLASS_NAME: &str = "GARBAGE";

/// Default name of the empty class used when converting to a stream
pub const REST_CLASS_NAME: &str = "REST";

/// User name assigned to samples when the caller does not supply one
pub const GARBAGE_USER_NAME: &str = "NOBODY";

/// True if `key` can be stored as an attribute name of the info file's meta element
pub fn is_meta_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Kind of an annotation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemeType {
    /// Segments with a class from a fixed class table
    Discrete,

    /// Equidistant scores at a fixed sample rate
    Continuous,

    /// Segments with arbitrary text
    Free,
}

impl SchemeType {
    /// Name used in the info file
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeType::Discrete => "DISCRETE",
            SchemeType::Continuous => "CONTINUOUS",
            SchemeType::Free => "FREE",
        }
    }

    /// Parse a scheme type name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        [SchemeType::Discrete, SchemeType::Continuous, SchemeType::Free]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a discrete class table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub name: String,
    pub id: i32,
}

/// Class table of a discrete scheme.
///
/// Names and ids are unique, ids are non-negative and entries are kept
/// ordered by id. Ids do not have to be contiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTable {
    entries: Vec<ClassEntry>,
}

impl ClassTable {
    /// Create an empty class table
    pub fn new() -> Self {
        ClassTable::default()
    }

    /// Create a class table from names, assigning ids 0..n-1 in order
    pub fn from_names<I, S>(names: I) -> AnnotationResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pairs: Vec<(String, i32)> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.into(), i as i32))
            .collect();
        ClassTable::from_pairs(pairs)
    }

    /// Create a class table from explicit (name, id) pairs
    pub fn from_pairs<I, S>(pairs: I) -> AnnotationResult<Self>
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut table = ClassTable::new();
        for (name, id) in pairs {
            table.insert(name.into(), id)?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn contains_id(&self, id: i32) -> bool {
        self.index_of_id(id).is_some()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Id of the class with the given name
    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.id)
    }

    /// Position of the class with the given id in the table
    pub fn index_of_id(&self, id: i32) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Name of the class with the given id
    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
    }

    /// Largest id in the table
    pub fn max_id(&self) -> Option<i32> {
        self.entries.iter().map(|e| e.id).max()
    }

    /// Id that a newly added class receives
    pub fn next_id(&self) -> i32 {
        self.max_id().map_or(0, |id| id + 1)
    }

    /// Insert a class, keeping the table ordered by id
    pub(crate) fn insert(&mut self, name: String, id: i32) -> AnnotationResult<()> {
        if name.is_empty() {
            return Err(AnnotationError::EmptyClassName);
        }
        if name == GARBAGE_CLASS_NAME {
            return Err(AnnotationError::ReservedClassName(name));
        }
        if id < 0 {
            return Err(AnnotationError::NegativeClassId(id));
        }
        if self.contains_name(&name) {
            return Err(AnnotationError::DuplicateClassName(name));
        }
        if self.contains_id(id) {
            return Err(AnnotationError::DuplicateClassId(id));
        }

        let pos = self.entries.partition_point(|e| e.id < id);
        self.entries.insert(pos, ClassEntry { name, id });
        Ok(())
    }

    pub(crate) fn rename(&mut self, from: &str, to: String) -> bool {
        match self.entries.iter_mut().find(|e| e.name == from) {
            Some(entry) => {
                entry.name = to;
                true
            }
            None => false,
        }
    }

    pub(crate) fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&ClassEntry) -> bool,
    {
        self.entries.retain(keep);
    }
}

impl<'a> IntoIterator for &'a ClassTable {
    type Item = &'a ClassEntry;
    type IntoIter = std::slice::Iter<'a, ClassEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Kind-specific payload of a scheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemeKind {
    Discrete(ClassTable),

    /// Valid score range is advisory: scores outside it are warned about, not rejected
    Continuous {
        sample_rate: f64,
        min_score: f32,
        max_score: f32,
    },

    Free,
}

/// Type descriptor of the labels held by an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheme {
    name: String,
    kind: SchemeKind,
}

impl Scheme {
    pub fn discrete(name: impl Into<String>, classes: ClassTable) -> Self {
        Scheme {
            name: name.into(),
            kind: SchemeKind::Discrete(classes),
        }
    }

    pub fn continuous(
        name: impl Into<String>,
        sample_rate: f64,
        min_score: f32,
        max_score: f32,
    ) -> AnnotationResult<Self> {
        if !(sample_rate > 0.0) {
            return Err(AnnotationError::InvalidSampleRate(sample_rate));
        }
        Ok(Scheme {
            name: name.into(),
            kind: SchemeKind::Continuous {
                sample_rate,
                min_score,
                max_score,
            },
        })
    }

    pub fn free(name: impl Into<String>) -> Self {
        Scheme {
            name: name.into(),
            kind: SchemeKind::Free,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn kind(&self) -> &SchemeKind {
        &self.kind
    }

    pub fn scheme_type(&self) -> SchemeType {
        match self.kind {
            SchemeKind::Discrete(_) => SchemeType::Discrete,
            SchemeKind::Continuous { .. } => SchemeType::Continuous,
            SchemeKind::Free => SchemeType::Free,
        }
    }

    /// Class table of a discrete scheme
    pub fn classes(&self) -> Option<&ClassTable> {
        match &self.kind {
            SchemeKind::Discrete(classes) => Some(classes),
            _ => None,
        }
    }

    pub(crate) fn classes_mut(&mut self) -> Option<&mut ClassTable> {
        match &mut self.kind {
            SchemeKind::Discrete(classes) => Some(classes),
            _ => None,
        }
    }

    /// Sample rate of a continuous scheme
    pub fn sample_rate(&self) -> Option<f64> {
        match self.kind {
            SchemeKind::Continuous { sample_rate, .. } => Some(sample_rate),
            _ => None,
        }
    }
}

/// Label of a discrete scheme: a segment with a class id
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscreteLabel {
    /// Segment start in seconds
    pub from: f64,
    /// Segment end in seconds
    pub to: f64,
    /// Class id, negative for garbage
    pub class_id: i32,
    pub confidence: f32,
}

impl DiscreteLabel {
    pub fn is_garbage(&self) -> bool {
        self.class_id < 0
    }
}

/// Label of a continuous scheme.
/// The i-th label of a sequence sits at time i / sample_rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContinuousLabel {
    /// Score, NaN marks a missing value
    pub score: f32,
    pub confidence: f32,
}

/// Label of a free scheme: a segment with arbitrary text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeLabel {
    pub from: f64,
    pub to: f64,
    pub name: String,
    pub confidence: f32,
}

/// A label of any scheme type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Label {
    Discrete(DiscreteLabel),
    Continuous(ContinuousLabel),
    Free(FreeLabel),
}

impl Label {
    pub fn scheme_type(&self) -> SchemeType {
        match self {
            Label::Discrete(_) => SchemeType::Discrete,
            Label::Continuous(_) => SchemeType::Continuous,
            Label::Free(_) => SchemeType::Free,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Label::Discrete(l) => l.confidence,
            Label::Continuous(l) => l.confidence,
            Label::Free(l) => l.confidence,
        }
    }
}

/// Segment view shared by discrete and free labels
pub trait Segment {
    fn start(&self) -> f64;
    fn stop(&self) -> f64;
    fn confidence(&self) -> f32;
    fn shift(&mut self, left: f64, right: f64);

    fn duration(&self) -> f64 {
        self.stop() - self.start()
    }
}

impl Segment for DiscreteLabel {
    fn start(&self) -> f64 {
        self.from
    }

    fn stop(&self) -> f64 {
        self.to
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn shift(&mut self, left: f64, right: f64) {
        self.from += left;
        self.to += right;
    }
}

impl Segment for FreeLabel {
    fn start(&self) -> f64 {
        self.from
    }

    fn stop(&self) -> f64 {
        self.to
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn shift(&mut self, left: f64, right: f64) {
        self.from += left;
        self.to += right;
    }
}

/// Label sequence whose element type follows the scheme type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Labels {
    Discrete(Vec<DiscreteLabel>),
    Continuous(Vec<ContinuousLabel>),
    Free(Vec<FreeLabel>),
}

impl Default for Labels {
    fn default() -> Self {
        Labels::Discrete(Vec::new())
    }
}

impl Labels {
    /// Empty sequence for a scheme type
    pub fn for_type(scheme_type: SchemeType) -> Self {
        match scheme_type {
            SchemeType::Discrete => Labels::Discrete(Vec::new()),
            SchemeType::Continuous => Labels::Continuous(Vec::new()),
            SchemeType::Free => Labels::Free(Vec::new()),
        }
    }

    pub fn scheme_type(&self) -> SchemeType {
        match self {
            Labels::Discrete(_) => SchemeType::Discrete,
            Labels::Continuous(_) => SchemeType::Continuous,
            Labels::Free(_) => SchemeType::Free,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Labels::Discrete(v) => v.len(),
            Labels::Continuous(v) => v.len(),
            Labels::Free(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            Labels::Discrete(v) => v.clear(),
            Labels::Continuous(v) => v.clear(),
            Labels::Free(v) => v.clear(),
        }
    }

    /// Copy of the label at `index`
    pub fn get(&self, index: usize) -> Option<Label> {
        match self {
            Labels::Discrete(v) => v.get(index).copied().map(Label::Discrete),
            Labels::Continuous(v) => v.get(index).copied().map(Label::Continuous),
            Labels::Free(v) => v.get(index).cloned().map(Label::Free),
        }
    }

    /// Iterate over copies of all labels
    pub fn iter(&self) -> impl Iterator<Item = Label> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub(crate) fn confidences(&self) -> Vec<f32> {
        match self {
            Labels::Discrete(v) => v.iter().map(|l| l.confidence).collect(),
            Labels::Continuous(v) => v.iter().map(|l| l.confidence).collect(),
            Labels::Free(v) => v.iter().map(|l| l.confidence).collect(),
        }
    }

    pub(crate) fn for_each_confidence<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut f32),
    {
        match self {
            Labels::Discrete(v) => v.iter_mut().for_each(|l| f(&mut l.confidence)),
            Labels::Continuous(v) => v.iter_mut().for_each(|l| f(&mut l.confidence)),
            Labels::Free(v) => v.iter_mut().for_each(|l| f(&mut l.confidence)),
        }
    }
}
