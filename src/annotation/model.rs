// Annotation model
// Owns one scheme with its label sequence and metadata; validated constructors and class table edits

use std::collections::BTreeMap;
use std::fmt;

use super::error::{AnnotationError, AnnotationResult};
use super::types::{
    is_meta_key, ClassTable, ContinuousLabel, DiscreteLabel, FreeLabel, Label, Labels, Scheme, SchemeKind,
    SchemeType, GARBAGE_CLASS_ID, GARBAGE_CLASS_NAME,
};

/// Time-aligned labels over a signal, all shaped by one scheme.
///
/// An annotation starts without a scheme. Setting a scheme replaces the
/// previous one and empties the label sequence. Labels can only be added
/// through constructors that check them against the scheme, so a label
/// never references a class id missing from the class table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    scheme: Option<Scheme>,
    labels: Labels,
    meta: BTreeMap<String, String>,
}

impl Annotation {
    /// Create an annotation without a scheme
    pub fn new() -> Self {
        Annotation::default()
    }

    /// Create an empty annotation with the given scheme
    pub fn with_scheme(scheme: Scheme) -> Self {
        let mut annotation = Annotation::new();
        annotation.set_scheme(scheme);
        annotation
    }

    // ==================== SCHEME ====================

    /// Replace the scheme and drop all labels
    pub fn set_scheme(&mut self, scheme: Scheme) {
        self.labels = Labels::for_type(scheme.scheme_type());
        self.scheme = Some(scheme);
    }

    /// Discrete scheme with ids 0..n-1 assigned in the given order
    pub fn set_discrete_scheme<I, S>(&mut self, name: &str, class_names: I) -> AnnotationResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes = ClassTable::from_names(class_names)?;
        self.set_scheme(Scheme::discrete(name, classes));
        Ok(())
    }

    /// Discrete scheme with explicit class ids
    pub fn set_discrete_scheme_with_ids<I, S>(&mut self, name: &str, classes: I) -> AnnotationResult<()>
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let classes = ClassTable::from_pairs(classes)?;
        self.set_scheme(Scheme::discrete(name, classes));
        Ok(())
    }

    pub fn set_continuous_scheme(
        &mut self,
        name: &str,
        sample_rate: f64,
        min_score: f32,
        max_score: f32,
    ) -> AnnotationResult<()> {
        let scheme = Scheme::continuous(name, sample_rate, min_score, max_score)?;
        self.set_scheme(scheme);
        Ok(())
    }

    pub fn set_free_scheme(&mut self, name: &str) {
        self.set_scheme(Scheme::free(name));
    }

    pub fn set_scheme_name(&mut self, name: &str) -> AnnotationResult<()> {
        let scheme = self.scheme.as_mut().ok_or(AnnotationError::NoScheme)?;
        scheme.set_name(name.to_string());
        Ok(())
    }

    pub fn has_scheme(&self) -> bool {
        self.scheme.is_some()
    }

    pub fn scheme(&self) -> Option<&Scheme> {
        self.scheme.as_ref()
    }

    pub fn scheme_type(&self) -> Option<SchemeType> {
        self.scheme.as_ref().map(Scheme::scheme_type)
    }

    /// Scheme of the expected type, or a logged mismatch error
    pub(crate) fn require(&self, expected: SchemeType) -> AnnotationResult<&Scheme> {
        let scheme = self.scheme.as_ref().ok_or_else(|| {
            log::warn!("annotation has no scheme");
            AnnotationError::NoScheme
        })?;

        let actual = scheme.scheme_type();
        if actual != expected {
            log::warn!("type mismatch '{} != {}'", expected, actual);
            return Err(AnnotationError::SchemeMismatch { expected, actual });
        }

        Ok(scheme)
    }

    /// Scheme of any type but `rejected`, or a logged error
    pub(crate) fn require_not(&self, rejected: SchemeType) -> AnnotationResult<&Scheme> {
        let scheme = self.scheme.as_ref().ok_or_else(|| {
            log::warn!("annotation has no scheme");
            AnnotationError::NoScheme
        })?;

        if scheme.scheme_type() == rejected {
            log::warn!("type not supported '{}'", rejected);
            return Err(AnnotationError::UnsupportedScheme(rejected));
        }

        Ok(scheme)
    }

    pub(crate) fn class_table(&self) -> AnnotationResult<&ClassTable> {
        self.require(SchemeType::Discrete)?
            .classes()
            .ok_or(AnnotationError::NoScheme)
    }

    fn class_table_mut(&mut self) -> AnnotationResult<&mut ClassTable> {
        self.require(SchemeType::Discrete)?;
        self.scheme
            .as_mut()
            .and_then(Scheme::classes_mut)
            .ok_or(AnnotationError::NoScheme)
    }

    // ==================== LABELS ====================

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Copy of the label at `index`
    pub fn get(&self, index: usize) -> Option<Label> {
        self.labels.get(index)
    }

    pub fn discrete_labels(&self) -> Option<&[DiscreteLabel]> {
        match (&self.scheme, &self.labels) {
            (Some(_), Labels::Discrete(v)) => Some(v),
            _ => None,
        }
    }

    pub fn continuous_labels(&self) -> Option<&[ContinuousLabel]> {
        match (&self.scheme, &self.labels) {
            (Some(_), Labels::Continuous(v)) => Some(v),
            _ => None,
        }
    }

    pub fn free_labels(&self) -> Option<&[FreeLabel]> {
        match (&self.scheme, &self.labels) {
            (Some(_), Labels::Free(v)) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }

    /// Replace the discrete labels wholesale; callers guarantee the ids are valid
    pub(crate) fn replace_discrete(&mut self, labels: Vec<DiscreteLabel>) {
        if let Labels::Discrete(v) = &mut self.labels {
            *v = labels;
        }
    }

    /// Append a discrete segment; negative ids are accepted as garbage
    pub fn add_discrete(
        &mut self,
        from: f64,
        to: f64,
        class_id: i32,
        confidence: f32,
    ) -> AnnotationResult<()> {
        let classes = self.class_table()?;
        if class_id >= 0 && !classes.contains_id(class_id) {
            log::warn!("unknown class id '{}'", class_id);
            return Err(AnnotationError::UnknownClassId(class_id));
        }

        if let Labels::Discrete(v) = &mut self.labels {
            v.push(DiscreteLabel {
                from,
                to,
                class_id,
                confidence,
            });
        }
        Ok(())
    }

    /// Append a discrete segment by class name
    pub fn add_discrete_by_name(
        &mut self,
        from: f64,
        to: f64,
        class_name: &str,
        confidence: f32,
    ) -> AnnotationResult<()> {
        if class_name.is_empty() {
            log::warn!("empty class name");
            return Err(AnnotationError::EmptyClassName);
        }
        let class_id = self.class_id(class_name)?;
        self.add_discrete(from, to, class_id, confidence)
    }

    /// Append a continuous score; scores outside the scheme range only warn
    pub fn add_continuous(&mut self, score: f32, confidence: f32) -> AnnotationResult<()> {
        let scheme = self.require(SchemeType::Continuous)?;
        if let SchemeKind::Continuous {
            min_score,
            max_score,
            ..
        } = *scheme.kind()
        {
            if score < min_score {
                log::warn!("score below min '{} < {}'", score, min_score);
            }
            if score > max_score {
                log::warn!("score above max '{} > {}'", score, max_score);
            }
        }

        if let Labels::Continuous(v) = &mut self.labels {
            v.push(ContinuousLabel { score, confidence });
        }
        Ok(())
    }

    /// Append a free-text segment
    pub fn add_free(
        &mut self,
        from: f64,
        to: f64,
        name: impl Into<String>,
        confidence: f32,
    ) -> AnnotationResult<()> {
        self.require(SchemeType::Free)?;

        if let Labels::Free(v) = &mut self.labels {
            v.push(FreeLabel {
                from,
                to,
                name: name.into(),
                confidence,
            });
        }
        Ok(())
    }

    /// Append a segment by name: a class name for discrete schemes, the text for free ones
    pub fn add_segment(
        &mut self,
        from: f64,
        to: f64,
        name: &str,
        confidence: f32,
    ) -> AnnotationResult<()> {
        let scheme_type = self.require_not(SchemeType::Continuous)?.scheme_type();
        match scheme_type {
            SchemeType::Discrete => self.add_discrete_by_name(from, to, name, confidence),
            _ => self.add_free(from, to, name, confidence),
        }
    }

    /// Like [`Annotation::add_segment`] with fields given as text; empty names are rejected
    pub fn add_segment_str(
        &mut self,
        from: &str,
        to: &str,
        name: &str,
        confidence: &str,
    ) -> AnnotationResult<()> {
        let confidence = parse_number(confidence)?;
        self.add_segment_str_with(from, to, name, confidence)
    }

    /// Text fields with a fixed confidence
    pub fn add_segment_str_with(
        &mut self,
        from: &str,
        to: &str,
        name: &str,
        confidence: f32,
    ) -> AnnotationResult<()> {
        if name.is_empty() {
            log::warn!("empty label name");
            return Err(AnnotationError::EmptyLabelName);
        }
        let from = parse_number(from)?;
        let to = parse_number(to)?;
        self.add_segment(from, to, name, confidence)
    }

    /// Append a continuous score given as text
    pub fn add_score_str(&mut self, score: &str, confidence: &str) -> AnnotationResult<()> {
        self.require(SchemeType::Continuous)?;
        let confidence = parse_number(confidence)?;
        self.add_continuous(parse_number(score)?, confidence)
    }

    /// Append a label of any kind; it must match the scheme type
    pub fn add_label(&mut self, label: Label) -> AnnotationResult<()> {
        let scheme_type = self
            .scheme_type()
            .ok_or(AnnotationError::NoScheme)?;
        if label.scheme_type() != scheme_type {
            log::warn!(
                "label of type '{}' does not fit scheme '{}'",
                label.scheme_type(),
                scheme_type
            );
            return Err(AnnotationError::LabelMismatch {
                label: label.scheme_type(),
                scheme: scheme_type,
            });
        }

        match label {
            Label::Discrete(l) => self.add_discrete(l.from, l.to, l.class_id, l.confidence),
            Label::Continuous(l) => self.add_continuous(l.score, l.confidence),
            Label::Free(l) => self.add_free(l.from, l.to, l.name, l.confidence),
        }
    }

    /// Append every label of `other`.
    /// Invalid labels are skipped; the last failure is returned after all others were added.
    pub fn extend_from(&mut self, other: &Annotation) -> AnnotationResult<()> {
        if !self.has_scheme() {
            return Err(AnnotationError::NoScheme);
        }

        let mut result = Ok(());
        for label in other.labels.iter() {
            if let Err(e) = self.add_label(label) {
                result = Err(e);
            }
        }
        result
    }

    /// Drop all labels, keep scheme and metadata
    pub fn clear(&mut self) {
        self.labels.clear();
    }

    /// Drop labels, scheme and metadata
    pub fn release(&mut self) {
        self.scheme = None;
        self.labels = Labels::default();
        self.meta.clear();
    }

    // ==================== META ====================

    /// Set a metadata entry; keys must be valid markup attribute names
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) -> AnnotationResult<()> {
        let key = key.into();
        if !is_meta_key(&key) {
            log::warn!("invalid meta key '{}'", key);
            return Err(AnnotationError::InvalidMetaKey(key));
        }
        self.meta.insert(key, value.into());
        Ok(())
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn meta_len(&self) -> usize {
        self.meta.len()
    }

    pub fn meta_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.meta.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    // ==================== CLASSES ====================

    /// True for garbage ids and ids present in the class table
    pub fn has_class_id(&self, class_id: i32) -> bool {
        match self.scheme.as_ref().and_then(Scheme::classes) {
            Some(classes) => class_id < 0 || classes.contains_id(class_id),
            None => false,
        }
    }

    /// True for the garbage name and names present in the class table
    pub fn has_class_name(&self, name: &str) -> bool {
        match self.scheme.as_ref().and_then(Scheme::classes) {
            Some(classes) => name == GARBAGE_CLASS_NAME || classes.contains_name(name),
            None => false,
        }
    }

    /// Id of a class name; the garbage name maps to [`GARBAGE_CLASS_ID`]
    pub fn class_id(&self, name: &str) -> AnnotationResult<i32> {
        let classes = self.class_table()?;
        if name == GARBAGE_CLASS_NAME {
            return Ok(GARBAGE_CLASS_ID);
        }
        classes.id_of(name).ok_or_else(|| {
            log::warn!("invalid class name '{}'", name);
            AnnotationError::UnknownClassName(name.to_string())
        })
    }

    /// Position of a class id in the class table; garbage has no position
    pub fn class_index(&self, class_id: i32) -> AnnotationResult<usize> {
        let classes = self.class_table()?;
        if class_id < 0 {
            return Err(AnnotationError::UnknownClassId(class_id));
        }
        classes.index_of_id(class_id).ok_or_else(|| {
            log::warn!("invalid class id '{}'", class_id);
            AnnotationError::UnknownClassId(class_id)
        })
    }

    pub fn class_index_by_name(&self, name: &str) -> AnnotationResult<usize> {
        let class_id = self.class_id(name)?;
        self.class_index(class_id)
    }

    /// Name of a class id; negative ids resolve to the garbage name
    pub fn class_name(&self, class_id: i32) -> Option<&str> {
        let classes = self.scheme.as_ref().and_then(Scheme::classes)?;
        if class_id < 0 {
            return Some(GARBAGE_CLASS_NAME);
        }
        let name = classes.name_of(class_id);
        if name.is_none() {
            log::warn!("invalid class id '{}'", class_id);
        }
        name
    }

    /// Number of labels carrying `class_id`
    pub fn class_size(&self, class_id: i32) -> AnnotationResult<usize> {
        self.require(SchemeType::Discrete)?;
        Ok(self
            .discrete_labels()
            .map_or(0, |v| v.iter().filter(|l| l.class_id == class_id).count()))
    }

    /// Add a class with the next free id and return its id.
    /// Existing names return their id, the garbage name returns [`GARBAGE_CLASS_ID`].
    pub fn add_class(&mut self, name: &str) -> AnnotationResult<i32> {
        let classes = self.class_table_mut()?;
        if name == GARBAGE_CLASS_NAME {
            return Ok(GARBAGE_CLASS_ID);
        }
        if let Some(id) = classes.id_of(name) {
            return Ok(id);
        }

        let id = classes.next_id();
        classes.insert(name.to_string(), id)?;
        Ok(id)
    }

    /// Add a class with an explicit id.
    /// Succeeds without change if the exact (name, id) pair already exists.
    pub fn add_class_with_id(&mut self, class_id: i32, name: &str) -> AnnotationResult<()> {
        let classes = self.class_table_mut()?;
        if let Some(existing) = classes.name_of(class_id) {
            if existing == name {
                return Ok(());
            }
            log::warn!("already has a class with id '{}'", class_id);
            return Err(AnnotationError::DuplicateClassId(class_id));
        }

        classes.insert(name.to_string(), class_id).map_err(|e| {
            log::warn!("could not add class '{}': {}", name, e);
            e
        })
    }

    /// Add several classes, skipping names that already exist
    pub fn add_classes<I, S>(&mut self, names: I) -> AnnotationResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        if names.iter().any(|n| n.as_ref().is_empty()) {
            log::warn!("empty class name");
            return Err(AnnotationError::EmptyClassName);
        }

        self.class_table_mut()?;
        for name in &names {
            self.add_class(name.as_ref())?;
        }
        Ok(())
    }

    pub fn remove_class(&mut self, name: &str) -> AnnotationResult<()> {
        self.remove_classes([name])
    }

    /// Remove classes and every label referencing them.
    /// Listing the garbage name also removes all garbage labels.
    pub fn remove_classes<I, S>(&mut self, names: I) -> AnnotationResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        let remove_garbage = names.iter().any(|n| n.as_ref() == GARBAGE_CLASS_NAME);

        let classes = self.class_table_mut()?;
        classes.retain(|entry| !names.iter().any(|n| n.as_ref() == entry.name));

        self.retain_known_classes(!remove_garbage);
        Ok(())
    }

    pub fn keep_class(&mut self, name: &str) -> AnnotationResult<()> {
        self.keep_classes([name])
    }

    /// Keep only the listed classes and the labels referencing them.
    /// Garbage labels survive only if the garbage name is listed.
    pub fn keep_classes<I, S>(&mut self, names: I) -> AnnotationResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        let keep_garbage = names.iter().any(|n| n.as_ref() == GARBAGE_CLASS_NAME);

        let classes = self.class_table_mut()?;
        classes.retain(|entry| names.iter().any(|n| n.as_ref() == entry.name));

        self.retain_known_classes(keep_garbage);
        Ok(())
    }

    /// Drop labels whose class left the class table
    fn retain_known_classes(&mut self, keep_garbage: bool) {
        let Some(classes) = self.scheme.as_ref().and_then(Scheme::classes) else {
            return;
        };
        if let Labels::Discrete(labels) = &mut self.labels {
            labels.retain(|l| {
                if l.class_id < 0 {
                    keep_garbage
                } else {
                    classes.contains_id(l.class_id)
                }
            });
        }
    }

    /// Rename a class; fails if the new name is already taken
    pub fn rename_class(&mut self, from: &str, to: &str) -> AnnotationResult<()> {
        self.class_table()?;
        if to.is_empty() {
            return Err(AnnotationError::EmptyClassName);
        }
        if self.has_class_name(to) {
            log::warn!("class name already exists '{}'", to);
            return Err(AnnotationError::DuplicateClassName(to.to_string()));
        }

        let classes = self.class_table_mut()?;
        if classes.rename(from, to.to_string()) {
            Ok(())
        } else {
            log::warn!("invalid class name '{}'", from);
            Err(AnnotationError::UnknownClassName(from.to_string()))
        }
    }

    /// Point every label of class `from` to class `to`.
    /// Unless `keep` is set, `from` is removed from the class table afterwards.
    pub fn map_class(&mut self, from: &str, to: &str, keep: bool) -> AnnotationResult<()> {
        let from_id = self.class_id(from)?;
        let to_id = self.class_id(to)?;
        if from_id == to_id {
            return Ok(());
        }

        if let Labels::Discrete(labels) = &mut self.labels {
            for label in labels.iter_mut().filter(|l| l.class_id == from_id) {
                label.class_id = to_id;
            }
        }

        if !keep {
            self.remove_class(from)?;
        }
        Ok(())
    }

    // ==================== DISPLAY ====================

    /// Tabular listing of the labels, limited to `max_rows` if given
    pub fn render_table(&self, max_rows: Option<usize>) -> String {
        let Some(scheme) = &self.scheme else {
            return String::new();
        };

        let rule = "-".repeat(55);
        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "{:>10}{:>10}{:>10}{:>15}{:>10}\n",
            "from(s)", "to(s)", "dur(s)", "label", "conf"
        ));
        out.push_str(&rule);
        out.push('\n');

        let limit = max_rows.unwrap_or(usize::MAX);
        match (&self.labels, scheme.kind()) {
            (Labels::Discrete(v), _) => {
                for l in v.iter().take(limit) {
                    let name = self.class_name(l.class_id).unwrap_or("?");
                    out.push_str(&format!(
                        "{:>10.3}{:>10.3}{:>10.3}{:>15}{:>10.3}\n",
                        l.from,
                        l.to,
                        l.to - l.from,
                        name,
                        l.confidence
                    ));
                }
            }
            (Labels::Continuous(v), SchemeKind::Continuous { sample_rate, .. }) => {
                let delta = 1.0 / sample_rate;
                for (i, l) in v.iter().take(limit).enumerate() {
                    let from = i as f64 * delta;
                    out.push_str(&format!(
                        "{:>10.3}{:>10.3}{:>10.3}{:>15.3}{:>10.3}\n",
                        from,
                        from + delta,
                        delta,
                        l.score,
                        l.confidence
                    ));
                }
            }
            (Labels::Free(v), _) => {
                for l in v.iter().take(limit) {
                    out.push_str(&format!(
                        "{:>10.3}{:>10.3}{:>10.3}{:>15}{:>10.3}\n",
                        l.from,
                        l.to,
                        l.to - l.from,
                        l.name,
                        l.confidence
                    ));
                }
            }
            _ => {}
        }

        out.push_str(&rule);
        out.push('\n');
        out
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_table(None))
    }
}

/// Parse a numeric field, surrounding whitespace is ignored
pub(crate) fn parse_number<T: std::str::FromStr>(value: &str) -> AnnotationResult<T> {
    value.trim().parse().map_err(|_| {
        log::warn!("invalid number '{}'", value);
        AnnotationError::InvalidNumber(value.to_string())
    })
}
