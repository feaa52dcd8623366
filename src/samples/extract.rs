// Sample extraction
// Cuts labeled stream ranges into training samples for discrete and continuous schemes

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::list::{Sample, SampleList};
use super::stream::Stream;
use crate::annotation::{
    Annotation, AnnotationError, DiscreteLabel, SchemeKind, SchemeType, GARBAGE_USER_NAME,
};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error("no streams given")]
    NoStreams,

    #[error("stream or annotation too short '{available}' for context {required}")]
    TooShort { available: usize, required: usize },

    #[error("copied sample data exceeds input stream (do labels overlap?)")]
    Overlap,
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Settings for sample extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    /// Frames before the center frame (continuous schemes)
    pub context_left: usize,

    /// Frames after the center frame (continuous schemes)
    pub context_right: usize,

    /// User name the samples are registered under
    pub user: String,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            context_left: 0,
            context_right: 0,
            user: GARBAGE_USER_NAME.to_string(),
        }
    }
}

/// Sample index of a time in seconds, rounded half up
fn time_to_index(time: f64, sample_rate: f64) -> usize {
    (time * sample_rate + 0.5) as usize
}

/// Inclusive sample range of a label, if it fits into the stream
fn label_range(label: &DiscreteLabel, stream: &Stream) -> Option<(usize, usize)> {
    if label.from < 0.0 || label.to < label.from {
        return None;
    }
    let start = time_to_index(label.from, stream.sample_rate);
    let stop = time_to_index(label.to, stream.sample_rate);
    if start <= stop && stop < stream.num {
        Some((start, stop))
    } else {
        None
    }
}

impl Annotation {
    /// Extract samples from one stream, dispatching on the scheme type.
    /// Continuous schemes use no context.
    pub fn extract_samples(
        &self,
        stream: &Stream,
        samples: &mut SampleList,
        user: Option<&str>,
    ) -> ExtractResult<usize> {
        let settings = ExtractSettings {
            user: user.unwrap_or(GARBAGE_USER_NAME).to_string(),
            ..Default::default()
        };
        self.extract_samples_with(stream, samples, &settings)
    }

    /// Extract samples from one stream with explicit settings
    pub fn extract_samples_with(
        &self,
        stream: &Stream,
        samples: &mut SampleList,
        settings: &ExtractSettings,
    ) -> ExtractResult<usize> {
        let scheme = self.require_not(SchemeType::Free)?;
        match scheme.scheme_type() {
            SchemeType::Continuous => self.extract_samples_from_continuous_scheme(
                stream,
                samples,
                settings.context_left,
                settings.context_right,
                Some(&settings.user),
            ),
            _ => self.extract_samples_from_discrete_scheme(
                std::slice::from_ref(stream),
                samples,
                Some(&settings.user),
            ),
        }
    }

    /// Turn every discrete label into one sample holding the labeled range
    /// of each synchronized stream.
    ///
    /// Labels outside a stream's bounds are skipped with a warning; a label
    /// is only used if it fits every stream. Returns the number of samples added.
    pub fn extract_samples_from_discrete_scheme(
        &self,
        streams: &[Stream],
        samples: &mut SampleList,
        user: Option<&str>,
    ) -> ExtractResult<usize> {
        let classes = self.class_table()?;
        if streams.is_empty() {
            return Err(ExtractError::NoStreams);
        }

        let user_id = samples.add_user_name(user.unwrap_or(GARBAGE_USER_NAME));
        let registry_ids: Vec<(i32, usize)> = classes
            .iter()
            .map(|entry| (entry.id, samples.add_class_name(&entry.name)))
            .collect();

        let mut added = 0;
        for label in self.discrete_labels().unwrap_or_default() {
            let chunks: Option<Vec<Stream>> = streams
                .iter()
                .map(|stream| {
                    let (start, stop) = label_range(label, stream)?;
                    stream.copy_range(start, stop)
                })
                .collect();

            let Some(chunks) = chunks else {
                log::warn!("interval out of range [{}..{}]s", label.from, label.to);
                continue;
            };

            let class_id = if label.is_garbage() {
                None
            } else {
                registry_ids
                    .iter()
                    .find(|(id, _)| *id == label.class_id)
                    .map(|&(_, index)| index)
            };

            samples.add_sample(Sample {
                class_id,
                user_id,
                score: 0.0,
                confidence: label.confidence,
                time: label.from,
                streams: chunks,
            });
            added += 1;
        }

        log::debug!("extracted {} samples from {} labels", added, self.len());
        Ok(added)
    }

    /// One sample per continuous label with `context_left` frames before and
    /// `context_right` frames after it. Labels with a NaN score are skipped.
    /// Returns the number of samples added.
    pub fn extract_samples_from_continuous_scheme(
        &self,
        stream: &Stream,
        samples: &mut SampleList,
        context_left: usize,
        context_right: usize,
        user: Option<&str>,
    ) -> ExtractResult<usize> {
        let scheme = self.require(SchemeType::Continuous)?;
        let SchemeKind::Continuous { sample_rate, .. } = *scheme.kind() else {
            return Err(AnnotationError::UnsupportedScheme(scheme.scheme_type()).into());
        };

        if stream.sample_rate != sample_rate {
            log::warn!(
                "sample rates do not fit '{} != {}'",
                stream.sample_rate,
                sample_rate
            );
        }

        let labels = self.continuous_labels().unwrap_or_default();
        let available = stream.num.min(labels.len());
        let context = context_left + context_right;
        if available <= context {
            log::warn!("stream or annotation too short '{}'", available);
            return Err(ExtractError::TooShort {
                available,
                required: context + 1,
            });
        }

        let user_id = samples.add_user_name(user.unwrap_or(GARBAGE_USER_NAME));
        let class_id = samples.add_class_name(scheme.name());
        let delta = 1.0 / sample_rate;

        let mut added = 0;
        for i in context_left..available - context_right {
            let label = &labels[i];
            if label.score.is_nan() {
                continue;
            }
            let Some(chunk) = stream.copy_range(i - context_left, i + context_right) else {
                continue;
            };

            samples.add_sample(Sample {
                class_id: Some(class_id),
                user_id,
                score: label.score,
                confidence: label.confidence,
                time: i as f64 * delta,
                streams: vec![chunk],
            });
            added += 1;
        }

        log::debug!("extracted {} samples from {} scores", added, labels.len());
        Ok(added)
    }

    /// Concatenate the ranges covered by the discrete labels into one stream.
    /// Labels beyond the end of the stream are skipped.
    pub fn extract_stream(&self, stream: &Stream) -> ExtractResult<Stream> {
        self.require(SchemeType::Discrete)?;

        let mut out = Stream {
            num: 0,
            dim: stream.dim,
            sample_type: stream.sample_type,
            sample_rate: stream.sample_rate,
            data: Vec::new(),
        };

        for label in self.discrete_labels().unwrap_or_default() {
            let start = time_to_index(label.from.max(0.0), stream.sample_rate);
            let stop = start.max(time_to_index(label.to.max(0.0), stream.sample_rate));
            if stop >= stream.num {
                log::warn!("label exceeds stream '{}-{}'", label.from, label.to);
                continue;
            }

            let len = stop - start + 1;
            if out.num + len > stream.num {
                log::warn!("copied sample data exceeds input stream (do labels overlap?)");
                return Err(ExtractError::Overlap);
            }

            if let Some(bytes) = stream.frames(start, stop) {
                out.data.extend_from_slice(bytes);
                out.num += len;
            }
        }

        Ok(out)
    }
}
