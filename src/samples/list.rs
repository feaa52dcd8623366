// Sample registry
// Collects labeled training samples together with their class and user name tables

use serde::{Deserialize, Serialize};

use super::stream::Stream;

/// A training example: one chunk per stream plus its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Index into the registry's class names, `None` for garbage
    pub class_id: Option<usize>,

    /// Index into the registry's user names
    pub user_id: usize,

    /// Regression target for continuous schemes, 0 otherwise
    pub score: f32,

    /// Confidence of the label the sample was cut from
    pub confidence: f32,

    /// Start time of the sample in seconds
    pub time: f64,

    /// One chunk per synchronized stream
    pub streams: Vec<Stream>,
}

impl Sample {
    pub fn is_garbage(&self) -> bool {
        self.class_id.is_none()
    }
}

/// Registry that accumulates samples across sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleList {
    class_names: Vec<String>,
    user_names: Vec<String>,
    samples: Vec<Sample>,
}

impl SampleList {
    pub fn new() -> Self {
        SampleList::default()
    }

    /// Register a class name and return its index; existing names keep their index
    pub fn add_class_name(&mut self, name: &str) -> usize {
        register(&mut self.class_names, name)
    }

    /// Register a user name and return its index; existing names keep their index
    pub fn add_user_name(&mut self, name: &str) -> usize {
        register(&mut self.user_names, name)
    }

    pub fn add_sample(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn user_names(&self) -> &[String] {
        &self.user_names
    }

    pub fn class_name(&self, index: usize) -> Option<&str> {
        self.class_names.get(index).map(String::as_str)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples per registered class, indexed like `class_names`
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for class_id in self.samples.iter().filter_map(|s| s.class_id) {
            if let Some(count) = counts.get_mut(class_id) {
                *count += 1;
            }
        }
        counts
    }

    /// Number of garbage samples
    pub fn garbage_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_garbage()).count()
    }
}

fn register(names: &mut Vec<String>, name: &str) -> usize {
    match names.iter().position(|n| n == name) {
        Some(index) => index,
        None => {
            names.push(name.to_string());
            names.len() - 1
        }
    }
}
