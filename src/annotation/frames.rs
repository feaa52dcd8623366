// Frame discretizer
// Resamples discrete segments into fixed-length frames and renders annotations as streams

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::{AnnotationError, AnnotationResult};
use super::model::Annotation;
use super::segments::sort_segments;
use super::types::{DiscreteLabel, SchemeKind, SchemeType, GARBAGE_CLASS_ID, GARBAGE_CLASS_NAME, REST_CLASS_NAME};
use crate::samples::Stream;

/// Settings for [`Annotation::convert_to_frames`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Length of one frame in seconds
    pub frame_duration: f64,

    /// Class assigned to frames without enough coverage; frames are skipped if unset
    pub empty_class: Option<String>,

    /// Covered duration in seconds, 0 means up to the end of the last label
    pub total_duration: f64,

    /// Minimum summed coverage a frame needs to take the dominant class
    pub empty_percent: f64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            frame_duration: 1.0,
            empty_class: None,
            total_duration: 0.0,
            empty_percent: 0.5,
        }
    }
}

impl FrameSettings {
    pub fn new(frame_duration: f64) -> Self {
        Self {
            frame_duration,
            ..Default::default()
        }
    }

    pub fn with_empty_class(mut self, name: impl Into<String>) -> Self {
        self.empty_class = Some(name.into());
        self
    }

    pub fn with_total_duration(mut self, duration: f64) -> Self {
        self.total_duration = duration;
        self
    }

    pub fn with_empty_percent(mut self, percent: f64) -> Self {
        self.empty_percent = percent;
        self
    }
}

impl Annotation {
    /// Replace the discrete labels with frames of `frame_duration` seconds.
    ///
    /// Each frame takes the class covering most of it. Garbage wins ties,
    /// a class has to cover strictly more to override it. Frames whose
    /// summed coverage does not exceed `empty_percent` get the empty class,
    /// or are dropped when no empty class is set. Dropped frames leave gaps
    /// in the output. Every frame gets confidence 1.0.
    ///
    /// Frame `i` starts at `i * frame_duration`. Widths equal
    /// `frame_duration` up to f64 rounding, exactly only when the duration
    /// is a power of two.
    pub fn convert_to_frames(&mut self, settings: &FrameSettings) -> AnnotationResult<()> {
        self.require(SchemeType::Discrete)?;

        let frame_duration = settings.frame_duration;
        if !(frame_duration > 0.0) {
            log::warn!("invalid frame duration '{}'", frame_duration);
            return Err(AnnotationError::InvalidFrameDuration(frame_duration));
        }

        let source: Vec<DiscreteLabel> = self.discrete_labels().unwrap_or_default().to_vec();

        let mut duration = settings.total_duration;
        if duration <= 0.0 {
            if let Some(last) = source.last() {
                duration = last.to;
            }
        }
        if !(duration > 0.0) {
            log::warn!("new annotation has zero length");
            return Err(AnnotationError::ZeroLength);
        }

        let add_empty = settings.empty_class.is_some();
        let mut empty_id = GARBAGE_CLASS_ID;
        if let Some(name) = settings.empty_class.as_deref() {
            if name != GARBAGE_CLASS_NAME {
                empty_id = self.add_class(name)?;
            }
        }

        let classes = self.class_table()?;
        let class_ids: Vec<i32> = classes.iter().map(|e| e.id).collect();
        let index_of: HashMap<i32, usize> = class_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let mut sorted = source;
        sort_segments(&mut sorted);

        let n_frames = (duration / frame_duration) as usize;
        let mut frames = Vec::with_capacity(n_frames);
        let mut coverage = vec![0.0f64; class_ids.len()];
        let mut cursor = 0;

        for i in 0..n_frames {
            let frame_from = i as f64 * frame_duration;
            let frame_to = frame_from + frame_duration;

            coverage.iter_mut().for_each(|c| *c = 0.0);
            let mut garbage = 0.0;

            // Skip labels that end before this frame
            while cursor < sorted.len() && sorted[cursor].to < frame_from {
                cursor += 1;
            }

            let mut found = false;
            let mut next = cursor;
            while next < sorted.len() && sorted[next].from < frame_to {
                let label = &sorted[next];
                let overlap = (frame_to.min(label.to) - frame_from.max(label.from)).max(0.0)
                    / frame_duration;
                if label.class_id < 0 {
                    garbage += overlap;
                } else if let Some(&index) = index_of.get(&label.class_id) {
                    coverage[index] += overlap;
                }
                found = true;
                next += 1;
            }

            let mut class_id = empty_id;
            let emit = if found {
                let mut max = garbage;
                let mut winner = GARBAGE_CLASS_ID;
                let mut total = garbage;
                for (index, &c) in coverage.iter().enumerate() {
                    if c > max {
                        max = c;
                        winner = class_ids[index];
                    }
                    total += c;
                }

                if total > settings.empty_percent {
                    class_id = winner;
                    true
                } else {
                    add_empty
                }
            } else {
                add_empty
            };

            if emit {
                frames.push(DiscreteLabel {
                    from: frame_from,
                    to: frame_to,
                    class_id,
                    confidence: 1.0,
                });
            }
        }

        log::debug!(
            "converted {} labels into {} of {} frames",
            sorted.len(),
            frames.len(),
            n_frames
        );
        self.replace_discrete(frames);
        Ok(())
    }

    /// Render the annotation as a one-dimensional float stream.
    ///
    /// Continuous annotations yield their scores at the scheme rate and
    /// ignore the arguments. Discrete annotations are framed at
    /// `1 / sample_rate` with a rest class; the stream holds 0 for rest and
    /// garbage frames and `class_id + 1` otherwise. A `duration` of 0 ends
    /// at the last label.
    pub fn convert_to_stream(&self, sample_rate: f64, duration: f64) -> AnnotationResult<Stream> {
        let scheme = self.require_not(SchemeType::Free)?;

        if let SchemeKind::Continuous { sample_rate, .. } = *scheme.kind() {
            let scores: Vec<f32> = self
                .continuous_labels()
                .unwrap_or_default()
                .iter()
                .map(|l| l.score)
                .collect();
            return Ok(Stream::from_f32(&scores, 1, sample_rate));
        }

        if !(sample_rate > 0.0) {
            log::warn!("invalid sample rate '{}'", sample_rate);
            return Err(AnnotationError::InvalidSampleRate(sample_rate));
        }

        let mut framed = self.clone();
        let settings = FrameSettings::new(1.0 / sample_rate)
            .with_empty_class(REST_CLASS_NAME)
            .with_total_duration(duration);
        framed.convert_to_frames(&settings)?;

        let rest_id = framed.class_id(REST_CLASS_NAME)?;
        let values: Vec<f32> = framed
            .discrete_labels()
            .unwrap_or_default()
            .iter()
            .map(|l| {
                if l.class_id == rest_id {
                    0.0
                } else {
                    (l.class_id + 1) as f32
                }
            })
            .collect();

        Ok(Stream::from_f32(&values, 1, sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_annotation() -> Annotation {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("ab", ["A", "B"]).unwrap();
        anno.add_discrete(0.0, 1.0, 0, 1.0).unwrap();
        anno.add_discrete(1.0, 2.0, 1, 1.0).unwrap();
        anno
    }

    #[test]
    fn test_two_labels_become_two_frames() {
        let mut anno = create_test_annotation();
        let settings = FrameSettings::new(1.0)
            .with_empty_class("REST")
            .with_total_duration(2.0);

        anno.convert_to_frames(&settings).unwrap();

        let frames = anno.discrete_labels().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], DiscreteLabel { from: 0.0, to: 1.0, class_id: 0, confidence: 1.0 });
        assert_eq!(frames[1], DiscreteLabel { from: 1.0, to: 2.0, class_id: 1, confidence: 1.0 });
        assert!(anno.has_class_name("REST"));
    }

    #[test]
    fn test_frames_have_exact_duration_and_increase() {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("x", ["A", "B", "C"]).unwrap();
        anno.add_discrete(0.3, 2.1, 2, 0.4).unwrap();
        anno.add_discrete(0.0, 0.9, 0, 0.7).unwrap();
        anno.add_discrete(2.0, 3.7, 1, 0.2).unwrap();

        let settings = FrameSettings::new(0.25).with_empty_class("REST");
        anno.convert_to_frames(&settings).unwrap();

        let frames = anno.discrete_labels().unwrap();
        // 3.7 / 0.25 = 14.8 frames, rounded down
        assert_eq!(frames.len(), 14);
        for pair in frames.windows(2) {
            assert!(pair[0].from < pair[1].from);
        }
        for frame in frames {
            assert_eq!(frame.to - frame.from, 0.25);
            assert_eq!(frame.confidence, 1.0);
        }
    }

    #[test]
    fn test_decimal_frame_duration_within_rounding() {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("x", ["A"]).unwrap();
        anno.add_discrete(0.0, 1.0, 0, 1.0).unwrap();

        anno.convert_to_frames(&FrameSettings::new(0.1)).unwrap();

        let frames = anno.discrete_labels().unwrap();
        assert_eq!(frames.len(), 10);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.from, i as f64 * 0.1);
            assert!((frame.to - frame.from - 0.1).abs() < 1e-12);
            assert_eq!(frame.class_id, 0);
        }
    }

    #[test]
    fn test_garbage_wins_ties() {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("x", ["A"]).unwrap();
        anno.add_discrete(0.0, 0.5, GARBAGE_CLASS_ID, 1.0).unwrap();
        anno.add_discrete(0.5, 1.0, 0, 1.0).unwrap();

        anno.convert_to_frames(&FrameSettings::new(1.0)).unwrap();

        let frames = anno.discrete_labels().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].class_id, GARBAGE_CLASS_ID);
    }

    #[test]
    fn test_low_coverage_uses_empty_class_or_skips() {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("x", ["A"]).unwrap();
        anno.add_discrete(0.0, 0.3, 0, 1.0).unwrap();
        anno.add_discrete(2.0, 3.0, 0, 1.0).unwrap();

        let mut with_empty = anno.clone();
        with_empty
            .convert_to_frames(&FrameSettings::new(1.0).with_empty_class("REST"))
            .unwrap();
        let rest = with_empty.class_id("REST").unwrap();
        let ids: Vec<i32> = with_empty
            .discrete_labels()
            .unwrap()
            .iter()
            .map(|l| l.class_id)
            .collect();
        assert_eq!(ids, vec![rest, rest, 0]);

        // Without an empty class the first two frames leave a gap
        anno.convert_to_frames(&FrameSettings::new(1.0)).unwrap();
        let frames = anno.discrete_labels().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].from, 2.0);
    }

    #[test]
    fn test_garbage_as_empty_class_is_not_registered() {
        let mut anno = create_test_annotation();

        let settings = FrameSettings::new(1.0)
            .with_empty_class(GARBAGE_CLASS_NAME)
            .with_total_duration(3.0);
        anno.convert_to_frames(&settings).unwrap();

        let frames = anno.discrete_labels().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].class_id, GARBAGE_CLASS_ID);
        assert_eq!(anno.scheme().and_then(|s| s.classes()).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_annotation_has_zero_length() {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("x", ["A"]).unwrap();

        assert!(matches!(
            anno.convert_to_frames(&FrameSettings::default()),
            Err(AnnotationError::ZeroLength)
        ));
        assert!(anno.convert_to_frames(&FrameSettings::new(0.0)).is_err());
    }

    #[test]
    fn test_failed_conversion_leaves_class_table_alone() {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("x", ["A"]).unwrap();

        let settings = FrameSettings::new(1.0).with_empty_class("REST");
        assert!(matches!(
            anno.convert_to_frames(&settings),
            Err(AnnotationError::ZeroLength)
        ));
        assert!(!anno.has_class_name("REST"));
        assert_eq!(anno.scheme().and_then(|s| s.classes()).unwrap().len(), 1);
    }

    #[test]
    fn test_frames_require_discrete_scheme() {
        let mut anno = Annotation::new();
        anno.set_free_scheme("notes");

        assert!(matches!(
            anno.convert_to_frames(&FrameSettings::default()),
            Err(AnnotationError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_discrete_to_stream() {
        let anno = create_test_annotation();

        let stream = anno.convert_to_stream(2.0, 3.0).unwrap();

        assert_eq!(stream.sample_rate, 2.0);
        assert_eq!(stream.to_f32().unwrap(), vec![1.0, 1.0, 2.0, 2.0, 0.0, 0.0]);
        // Source annotation is untouched
        assert_eq!(anno.len(), 2);
    }

    #[test]
    fn test_continuous_to_stream() {
        let mut anno = Annotation::new();
        anno.set_continuous_scheme("arousal", 5.0, 0.0, 1.0).unwrap();
        anno.add_continuous(0.1, 1.0).unwrap();
        anno.add_continuous(0.7, 1.0).unwrap();

        let stream = anno.convert_to_stream(0.0, 0.0).unwrap();

        assert_eq!(stream.num, 2);
        assert_eq!(stream.sample_rate, 5.0);
        assert_eq!(stream.value_f32(1, 0), Some(0.7));

        let mut free = Annotation::new();
        free.set_free_scheme("notes");
        assert!(matches!(
            free.convert_to_stream(1.0, 1.0),
            Err(AnnotationError::UnsupportedScheme(SchemeType::Free))
        ));
    }
}
