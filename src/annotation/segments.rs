// Segment algebra
// In-place transformations over a label sequence: sorting, filtering, packing, overlap removal, shifting

use serde::{Deserialize, Serialize};

use super::error::AnnotationResult;
use super::model::Annotation;
use super::types::{Labels, Segment, SchemeType};

/// Label property tested by [`Annotation::filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterProperty {
    Confidence,
    Duration,
    From,
    To,
}

impl FilterProperty {
    fn value_of<S: Segment>(&self, segment: &S) -> f64 {
        match self {
            FilterProperty::Confidence => segment.confidence() as f64,
            FilterProperty::Duration => segment.duration(),
            FilterProperty::From => segment.start(),
            FilterProperty::To => segment.stop(),
        }
    }
}

/// Comparison applied by [`Annotation::filter`]: `value <op> threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

impl FilterOperator {
    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            FilterOperator::Greater => value > threshold,
            FilterOperator::GreaterEqual => value >= threshold,
            FilterOperator::Less => value < threshold,
            FilterOperator::LessEqual => value <= threshold,
            FilterOperator::Equal => value == threshold,
            FilterOperator::NotEqual => value != threshold,
        }
    }
}

/// Stable sort by start time, then end time
pub(crate) fn sort_segments<S: Segment>(segments: &mut [S]) {
    segments.sort_by(|a, b| {
        a.start()
            .total_cmp(&b.start())
            .then(a.stop().total_cmp(&b.stop()))
    });
}

impl Annotation {
    /// Order discrete and free labels by (from, to).
    /// Continuous labels are positional and stay untouched.
    pub fn sort(&mut self) {
        match self.labels_mut() {
            Labels::Discrete(v) => sort_segments(v),
            Labels::Free(v) => sort_segments(v),
            Labels::Continuous(_) => {}
        }
    }

    /// Keep labels whose `property` satisfies `operator` against `threshold`.
    ///
    /// With a `class_name` the test only applies to labels of that class;
    /// labels of other classes are kept. Relative order is preserved.
    pub fn filter(
        &mut self,
        threshold: f64,
        property: FilterProperty,
        operator: FilterOperator,
        class_name: Option<&str>,
    ) -> AnnotationResult<()> {
        self.require_not(SchemeType::Continuous)?;

        let hot_class = match class_name {
            Some(name) if self.has_class_name(name) => self.class_id(name).ok(),
            Some(name) => {
                log::warn!("class '{}' not found, filtering all labels", name);
                None
            }
            None => None,
        };

        let keep = |value: f64| operator.apply(value, threshold);
        match self.labels_mut() {
            Labels::Discrete(v) => v.retain(|l| {
                if hot_class.is_some_and(|id| id != l.class_id) {
                    return true;
                }
                keep(property.value_of(l))
            }),
            Labels::Free(v) => v.retain(|l| keep(property.value_of(l))),
            Labels::Continuous(_) => {}
        }
        Ok(())
    }

    /// Merge successive labels of the same class whose gap is at most `max_gap`.
    ///
    /// Labels are sorted first. A merged label spans all of its parts and
    /// carries their mean confidence. With a `class_name` only that class is packed.
    pub fn pack_class(&mut self, max_gap: f64, class_name: Option<&str>) -> AnnotationResult<()> {
        self.require(SchemeType::Discrete)?;

        let hot_class = match class_name {
            Some(name) if self.has_class_name(name) => self.class_id(name).ok(),
            _ => None,
        };

        let Labels::Discrete(labels) = self.labels_mut() else {
            return Ok(());
        };
        let mut sorted = labels.clone();
        sort_segments(&mut sorted);

        let mut iter = sorted.into_iter();
        let Some(mut current) = iter.next() else {
            return Ok(());
        };

        let mut packed = Vec::with_capacity(labels.len());
        let mut sum = current.confidence;
        let mut count = 1usize;
        for next in iter {
            let same_class = next.class_id == current.class_id;
            let close = next.from - current.to <= max_gap;
            let selected = hot_class.map_or(true, |id| id == next.class_id);

            if same_class && close && selected {
                current.to = current.to.max(next.to);
                sum += next.confidence;
                count += 1;
            } else {
                current.confidence = sum / count as f32;
                packed.push(current);

                current = next;
                sum = next.confidence;
                count = 1;
            }
        }
        current.confidence = sum / count as f32;
        packed.push(current);

        *labels = packed;
        Ok(())
    }

    /// Clamp each label's end to the start of the following label.
    /// Works on the current order, so sort first.
    pub fn remove_overlap(&mut self) -> AnnotationResult<()> {
        self.require(SchemeType::Discrete)?;

        if let Labels::Discrete(v) = self.labels_mut() {
            for i in 1..v.len() {
                let next_from = v[i].from;
                let prev = &mut v[i - 1];
                prev.to = prev.to.min(next_from);
            }
        }
        Ok(())
    }

    /// Shift every start by `left` and every end by `right` seconds
    pub fn add_offset(&mut self, left: f64, right: f64) -> AnnotationResult<()> {
        self.require_not(SchemeType::Continuous)?;

        match self.labels_mut() {
            Labels::Discrete(v) => v.iter_mut().for_each(|l| l.shift(left, right)),
            Labels::Free(v) => v.iter_mut().for_each(|l| l.shift(left, right)),
            Labels::Continuous(_) => {}
        }
        Ok(())
    }

    /// Rescale confidences linearly to [0, 1] using the observed min and max.
    /// Does nothing if all confidences are equal.
    pub fn norm_confidence(&mut self) {
        let confidences = self.labels().confidences();
        let min = confidences.iter().copied().fold(f32::MAX, f32::min);
        let max = confidences.iter().copied().fold(-f32::MAX, f32::max);

        let divisor = max - min;
        if confidences.is_empty() || divisor == 0.0 {
            return;
        }
        self.labels_mut()
            .for_each_confidence(|c| *c = (*c - min) / divisor);
    }

    /// Assign the same confidence to every label
    pub fn set_confidence(&mut self, confidence: f32) {
        self.labels_mut().for_each_confidence(|c| *c = confidence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::types::{DiscreteLabel, GARBAGE_CLASS_ID};

    fn create_discrete(labels: &[(f64, f64, i32, f32)]) -> Annotation {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("speech", ["voice", "noise", "music"])
            .unwrap();
        for &(from, to, id, conf) in labels {
            anno.add_discrete(from, to, id, conf).unwrap();
        }
        anno
    }

    fn spans(anno: &Annotation) -> Vec<(f64, f64, i32)> {
        anno.discrete_labels()
            .unwrap()
            .iter()
            .map(|l| (l.from, l.to, l.class_id))
            .collect()
    }

    #[test]
    fn test_sort_orders_by_from_then_to() {
        let mut anno = create_discrete(&[
            (2.0, 3.0, 0, 1.0),
            (0.0, 2.0, 1, 1.0),
            (0.0, 1.0, 2, 1.0),
        ]);

        anno.sort();

        assert_eq!(
            spans(&anno),
            vec![(0.0, 1.0, 2), (0.0, 2.0, 1), (2.0, 3.0, 0)]
        );
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut anno = create_discrete(&[
            (5.0, 6.0, 0, 0.1),
            (1.0, 2.0, 1, 0.2),
            (1.0, 2.0, 2, 0.3),
            (3.0, 4.0, 0, 0.4),
        ]);

        anno.sort();
        let once = anno.clone();
        anno.sort();

        assert_eq!(anno, once);
        // Equal keys keep their original relative order
        assert_eq!(spans(&anno)[0].2, 1);
        assert_eq!(spans(&anno)[1].2, 2);
    }

    #[test]
    fn test_sort_free_labels() {
        let mut anno = Annotation::new();
        anno.set_free_scheme("words");
        anno.add_free(1.0, 2.0, "world", 1.0).unwrap();
        anno.add_free(0.0, 1.0, "hello", 1.0).unwrap();

        anno.sort();

        assert_eq!(anno.free_labels().unwrap()[0].name, "hello");
    }

    #[test]
    fn test_filter_by_confidence() {
        let mut anno = create_discrete(&[
            (0.0, 1.0, 0, 0.9),
            (1.0, 2.0, 1, 0.2),
            (2.0, 3.0, 2, 0.5),
        ]);

        anno.filter(
            0.5,
            FilterProperty::Confidence,
            FilterOperator::GreaterEqual,
            None,
        )
        .unwrap();

        assert_eq!(spans(&anno), vec![(0.0, 1.0, 0), (2.0, 3.0, 2)]);
    }

    #[test]
    fn test_filter_by_duration_with_class_restriction() {
        let mut anno = create_discrete(&[
            (0.0, 0.1, 0, 1.0),
            (1.0, 3.0, 0, 1.0),
            (3.0, 3.1, 1, 1.0),
        ]);

        anno.filter(
            0.5,
            FilterProperty::Duration,
            FilterOperator::Greater,
            Some("voice"),
        )
        .unwrap();

        // Short noise label is not subject to the filter
        assert_eq!(spans(&anno), vec![(1.0, 3.0, 0), (3.0, 3.1, 1)]);
    }

    #[test]
    fn test_filter_operators() {
        assert!(FilterOperator::Greater.apply(2.0, 1.0));
        assert!(!FilterOperator::Greater.apply(1.0, 1.0));
        assert!(FilterOperator::GreaterEqual.apply(1.0, 1.0));
        assert!(FilterOperator::Less.apply(0.5, 1.0));
        assert!(FilterOperator::LessEqual.apply(1.0, 1.0));
        assert!(FilterOperator::Equal.apply(1.0, 1.0));
        assert!(FilterOperator::NotEqual.apply(2.0, 1.0));
    }

    #[test]
    fn test_filter_rejects_continuous() {
        let mut anno = Annotation::new();
        anno.set_continuous_scheme("valence", 10.0, -1.0, 1.0).unwrap();

        assert!(anno
            .filter(0.0, FilterProperty::From, FilterOperator::Equal, None)
            .is_err());
    }

    #[test]
    fn test_pack_class_merges_close_segments() {
        let mut anno = create_discrete(&[
            (2.1, 3.0, 0, 0.2),
            (0.0, 1.0, 0, 1.0),
            (1.0, 2.0, 0, 0.6),
            (3.0, 4.0, 1, 1.0),
            (6.0, 7.0, 1, 0.5),
        ]);

        anno.pack_class(0.2, None).unwrap();

        let labels = anno.discrete_labels().unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!((labels[0].from, labels[0].to), (0.0, 3.0));
        assert!((labels[0].confidence - 0.6).abs() < 1e-6);
        assert_eq!((labels[1].from, labels[1].to), (3.0, 4.0));
        assert_eq!((labels[2].from, labels[2].to), (6.0, 7.0));
    }

    #[test]
    fn test_pack_class_restricted_to_one_class() {
        let mut anno = create_discrete(&[
            (0.0, 1.0, 0, 1.0),
            (1.0, 2.0, 0, 1.0),
            (2.0, 3.0, 1, 1.0),
            (3.0, 4.0, 1, 1.0),
        ]);

        anno.pack_class(0.0, Some("noise")).unwrap();

        assert_eq!(
            spans(&anno),
            vec![(0.0, 1.0, 0), (1.0, 2.0, 0), (2.0, 4.0, 1)]
        );
    }

    #[test]
    fn test_pack_class_keeps_garbage_separate() {
        let mut anno = create_discrete(&[
            (0.0, 1.0, GARBAGE_CLASS_ID, 1.0),
            (1.0, 2.0, 0, 1.0),
            (2.0, 3.0, GARBAGE_CLASS_ID, 1.0),
        ]);

        anno.pack_class(10.0, None).unwrap();

        assert_eq!(anno.len(), 3);
    }

    #[test]
    fn test_remove_overlap_uses_current_order() {
        let mut anno = create_discrete(&[
            (0.0, 1.5, 0, 1.0),
            (1.0, 2.5, 1, 1.0),
            (2.0, 3.0, 2, 1.0),
        ]);

        anno.remove_overlap().unwrap();

        assert_eq!(
            spans(&anno),
            vec![(0.0, 1.0, 0), (1.0, 2.0, 1), (2.0, 3.0, 2)]
        );
    }

    #[test]
    fn test_add_offset() {
        let mut anno = create_discrete(&[(1.0, 2.0, 0, 1.0)]);

        anno.add_offset(-0.5, 0.25).unwrap();

        assert_eq!(
            anno.discrete_labels().unwrap()[0],
            DiscreteLabel {
                from: 0.5,
                to: 2.25,
                class_id: 0,
                confidence: 1.0
            }
        );

        let mut continuous = Annotation::new();
        continuous
            .set_continuous_scheme("valence", 10.0, -1.0, 1.0)
            .unwrap();
        assert!(continuous.add_offset(1.0, 1.0).is_err());
    }

    #[test]
    fn test_norm_confidence() {
        let mut anno = create_discrete(&[
            (0.0, 1.0, 0, 2.0),
            (1.0, 2.0, 1, 4.0),
            (2.0, 3.0, 2, 3.0),
        ]);

        anno.norm_confidence();

        let confidences: Vec<f32> = anno
            .discrete_labels()
            .unwrap()
            .iter()
            .map(|l| l.confidence)
            .collect();
        assert_eq!(confidences, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_norm_confidence_equal_values_untouched() {
        let mut anno = create_discrete(&[(0.0, 1.0, 0, 0.7), (1.0, 2.0, 1, 0.7)]);

        anno.norm_confidence();

        assert!(anno
            .discrete_labels()
            .unwrap()
            .iter()
            .all(|l| l.confidence == 0.7));
    }

    #[test]
    fn test_set_confidence() {
        let mut anno = Annotation::new();
        anno.set_continuous_scheme("valence", 10.0, -1.0, 1.0).unwrap();
        anno.add_continuous(0.1, 0.2).unwrap();
        anno.add_continuous(0.3, 0.4).unwrap();

        anno.set_confidence(1.0);

        assert!(anno
            .continuous_labels()
            .unwrap()
            .iter()
            .all(|l| l.confidence == 1.0));
    }
}
