// Stream import
// Builds continuous scores and discrete activity segments from float streams

use super::error::{AnnotationError, AnnotationResult};
use super::model::Annotation;
use super::types::{DiscreteLabel, Labels, SchemeType};
use crate::samples::{SampleType, Stream};

impl Annotation {
    /// Append one continuous label per frame, score taken from `score_dim`
    pub fn add_scores_from_stream(
        &mut self,
        stream: &Stream,
        score_dim: usize,
        confidence: f32,
    ) -> AnnotationResult<()> {
        let scores = self.read_score_dims(stream, score_dim, None)?;
        for (score, _) in scores {
            self.add_continuous(score, confidence)?;
        }
        Ok(())
    }

    /// Append one continuous label per frame with score and confidence from two dimensions
    pub fn add_scores_and_confidence_from_stream(
        &mut self,
        stream: &Stream,
        score_dim: usize,
        confidence_dim: usize,
    ) -> AnnotationResult<()> {
        let scores = self.read_score_dims(stream, score_dim, Some(confidence_dim))?;
        for (score, confidence) in scores {
            self.add_continuous(score, confidence)?;
        }
        Ok(())
    }

    fn read_score_dims(
        &self,
        stream: &Stream,
        score_dim: usize,
        confidence_dim: Option<usize>,
    ) -> AnnotationResult<Vec<(f32, f32)>> {
        let scheme = self.require(SchemeType::Continuous)?;
        check_float_dim(stream, score_dim)?;
        if let Some(dim) = confidence_dim {
            check_float_dim(stream, dim)?;
        }

        if let Some(sample_rate) = scheme.sample_rate() {
            if sample_rate != stream.sample_rate {
                log::warn!(
                    "sample rate mismatch '{} != {}'",
                    stream.sample_rate,
                    sample_rate
                );
            }
        }

        Ok((0..stream.num)
            .filter_map(|i| {
                let score = stream.value_f32(i, score_dim)?;
                let confidence = match confidence_dim {
                    Some(dim) => stream.value_f32(i, dim)?,
                    None => 1.0,
                };
                Some((score, confidence))
            })
            .collect())
    }

    /// Append a discrete segment for every run where dimension `dim` stays
    /// above `threshold`. Runs shorter than `min_duration` seconds are dropped.
    pub fn add_activity_from_stream(
        &mut self,
        stream: &Stream,
        dim: usize,
        threshold: f32,
        class_id: i32,
        confidence: f32,
        min_duration: f64,
    ) -> AnnotationResult<()> {
        self.require(SchemeType::Discrete)?;
        if !self.has_class_id(class_id) {
            log::warn!("unknown class id '{}'", class_id);
            return Err(AnnotationError::UnknownClassId(class_id));
        }
        check_float_dim(stream, dim)?;
        if !(stream.sample_rate > 0.0) {
            return Err(AnnotationError::InvalidSampleRate(stream.sample_rate));
        }

        let dt = 1.0 / stream.sample_rate;
        let mut segments = Vec::new();
        let mut active_since: Option<f64> = None;

        for i in 0..stream.num {
            let time = i as f64 * dt;
            let above = stream.value_f32(i, dim).is_some_and(|x| x > threshold);
            match (active_since, above) {
                (Some(from), false) => {
                    segments.push((from, time));
                    active_since = None;
                }
                (None, true) => active_since = Some(time),
                _ => {}
            }
        }
        if let Some(from) = active_since {
            segments.push((from, stream.num as f64 * dt));
        }

        let before = self.len();
        if let Labels::Discrete(labels) = self.labels_mut() {
            labels.extend(
                segments
                    .into_iter()
                    .filter(|(from, to)| to - from >= min_duration)
                    .map(|(from, to)| DiscreteLabel {
                        from,
                        to,
                        class_id,
                        confidence,
                    }),
            );
        }
        log::debug!("added {} activity segments", self.len() - before);
        Ok(())
    }
}

fn check_float_dim(stream: &Stream, dim: usize) -> AnnotationResult<()> {
    if stream.sample_type != SampleType::F32 {
        log::warn!("stream is not of type float");
        return Err(AnnotationError::NotFloatStream);
    }
    if dim >= stream.dim {
        log::warn!("invalid stream dimension '{} >= {}'", dim, stream.dim);
        return Err(AnnotationError::InvalidDimension {
            dim,
            stream_dim: stream.dim,
        });
    }
    Ok(())
}
