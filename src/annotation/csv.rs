// Delimited text import
// Reads label columns from CSV-like tables into discrete, free and continuous annotations

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::error::{AnnotationError, AnnotationResult};
use super::model::{parse_number, Annotation};
use super::types::SchemeType;

/// Column selector, by position or by header name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvColumn {
    Index(usize),
    Name(String),
}

impl From<usize> for CsvColumn {
    fn from(index: usize) -> Self {
        CsvColumn::Index(index)
    }
}

impl From<&str> for CsvColumn {
    fn from(name: &str) -> Self {
        CsvColumn::Name(name.to_string())
    }
}

/// Where label confidences come from
#[derive(Debug, Clone, PartialEq)]
pub enum CsvConfidence {
    Column(CsvColumn),
    Fixed(f32),
}

impl From<f32> for CsvConfidence {
    fn from(confidence: f32) -> Self {
        CsvConfidence::Fixed(confidence)
    }
}

impl From<usize> for CsvConfidence {
    fn from(index: usize) -> Self {
        CsvConfidence::Column(CsvColumn::Index(index))
    }
}

impl From<&str> for CsvConfidence {
    fn from(name: &str) -> Self {
        CsvConfidence::Column(CsvColumn::Name(name.to_string()))
    }
}

/// Rows of delimited text. Cells are trimmed, quoting is not supported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    header: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Read a table; blank lines are skipped
    pub fn read<R: BufRead>(reader: R, delimiter: char, has_header: bool) -> AnnotationResult<Self> {
        let mut table = CsvTable::default();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<String> = line
                .split(delimiter)
                .map(|cell| cell.trim().to_string())
                .collect();

            if has_header && table.header.is_none() {
                table.header = Some(cells);
            } else {
                table.rows.push(cells);
            }
        }

        Ok(table)
    }

    pub fn parse(text: &str, delimiter: char, has_header: bool) -> AnnotationResult<Self> {
        Self::read(text.as_bytes(), delimiter, has_header)
    }

    pub fn load(path: impl AsRef<Path>, delimiter: char, has_header: bool) -> AnnotationResult<Self> {
        let file = File::open(path.as_ref())?;
        let table = Self::read(BufReader::new(file), delimiter, has_header)?;
        log::debug!(
            "read {} rows from '{}'",
            table.rows.len(),
            path.as_ref().display()
        );
        Ok(table)
    }

    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Columns of the header, or of the first row without one
    pub fn column_count(&self) -> usize {
        self.header
            .as_ref()
            .or_else(|| self.rows.first())
            .map_or(0, Vec::len)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Resolve a column selector to a position
    pub fn column_index(&self, column: &CsvColumn) -> AnnotationResult<usize> {
        let columns = self.column_count();
        match column {
            CsvColumn::Index(index) if *index < columns => Ok(*index),
            CsvColumn::Index(index) => {
                log::warn!("invalid column index '{} >= {}'", index, columns);
                Err(AnnotationError::InvalidColumn {
                    column: index.to_string(),
                    columns,
                })
            }
            CsvColumn::Name(name) => {
                let header = self.header.as_ref().ok_or_else(|| {
                    log::warn!("csv header is missing");
                    AnnotationError::MissingHeader
                })?;
                header.iter().position(|h| h == name).ok_or_else(|| {
                    log::warn!("invalid column name '{}'", name);
                    AnnotationError::InvalidColumn {
                        column: name.clone(),
                        columns,
                    }
                })
            }
        }
    }

    fn resolve_confidence(&self, confidence: &CsvConfidence) -> AnnotationResult<Confidence> {
        Ok(match confidence {
            CsvConfidence::Column(column) => Confidence::Column(self.column_index(column)?),
            CsvConfidence::Fixed(value) => Confidence::Fixed(*value),
        })
    }
}

#[derive(Clone, Copy)]
enum Confidence {
    Column(usize),
    Fixed(f32),
}

fn cell<'a>(row: &'a [String], index: usize, line: usize) -> AnnotationResult<&'a str> {
    row.get(index).map(String::as_str).ok_or_else(|| {
        log::warn!("row {} has no column {}", line, index);
        AnnotationError::InvalidColumn {
            column: index.to_string(),
            columns: row.len(),
        }
    })
}

impl Annotation {
    /// Append one segment per row of `table`.
    ///
    /// The name column holds class names for discrete schemes and the label
    /// text for free schemes. Rows the scheme rejects are logged and skipped.
    /// Returns the number of labels added.
    pub fn add_segments_from_csv(
        &mut self,
        table: &CsvTable,
        from: impl Into<CsvColumn>,
        to: impl Into<CsvColumn>,
        name: impl Into<CsvColumn>,
        confidence: impl Into<CsvConfidence>,
    ) -> AnnotationResult<usize> {
        self.require_not(SchemeType::Continuous)?;

        let from = table.column_index(&from.into())?;
        let to = table.column_index(&to.into())?;
        let name = table.column_index(&name.into())?;
        let confidence = table.resolve_confidence(&confidence.into())?;

        let mut added = 0;
        for (line, row) in table.rows().iter().enumerate() {
            let result = self.add_segment_row(row, line, [from, to, name], confidence);
            match result {
                Ok(()) => added += 1,
                Err(e) => log::warn!("skip row {}: {}", line, e),
            }
        }

        Ok(added)
    }

    fn add_segment_row(
        &mut self,
        row: &[String],
        line: usize,
        [from, to, name]: [usize; 3],
        confidence: Confidence,
    ) -> AnnotationResult<()> {
        let from = cell(row, from, line)?;
        let to = cell(row, to, line)?;
        let name = cell(row, name, line)?;
        match confidence {
            Confidence::Column(index) => self.add_segment_str(from, to, name, cell(row, index, line)?),
            Confidence::Fixed(value) => self.add_segment_str_with(from, to, name, value),
        }
    }

    /// Append one continuous score per row of `table`; returns the number added
    pub fn add_scores_from_csv(
        &mut self,
        table: &CsvTable,
        score: impl Into<CsvColumn>,
        confidence: impl Into<CsvConfidence>,
    ) -> AnnotationResult<usize> {
        self.require(SchemeType::Continuous)?;

        let score = table.column_index(&score.into())?;
        let confidence = table.resolve_confidence(&confidence.into())?;

        let mut added = 0;
        for (line, row) in table.rows().iter().enumerate() {
            let result = cell(row, score, line).and_then(|score| match confidence {
                Confidence::Column(index) => self.add_score_str(score, cell(row, index, line)?),
                Confidence::Fixed(value) => self.add_continuous(parse_number(score)?, value),
            });
            match result {
                Ok(()) => added += 1,
                Err(e) => log::warn!("skip row {}: {}", line, e),
            }
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_table() -> CsvTable {
        let text = "start;end;label;conf\n\
                    0.0;1.0;happy;0.9\n\
                    1.0;2.5;sad;0.4\n\
                    \n\
                    2.5;3.0;bored;1.0\n\
                    3.0;4.0;happy;oops\n";
        CsvTable::parse(text, ';', true).unwrap()
    }

    fn create_test_annotation() -> Annotation {
        let mut anno = Annotation::new();
        anno.set_discrete_scheme("emotion", ["happy", "sad"]).unwrap();
        anno
    }

    #[test]
    fn test_parse_table() {
        let table = create_test_table();

        assert!(table.has_header());
        assert_eq!(table.column_count(), 4);
        assert_eq!(table.row_count(), 4);
        assert_eq!(table.rows()[1][2], "sad");
        assert_eq!(table.column_index(&CsvColumn::from("conf")).unwrap(), 3);
    }

    #[test]
    fn test_segments_by_column_name() {
        let table = create_test_table();
        let mut anno = create_test_annotation();

        let added = anno
            .add_segments_from_csv(&table, "start", "end", "label", "conf")
            .unwrap();

        // Unknown class and unparseable confidence are skipped
        assert_eq!(added, 2);
        let labels = anno.discrete_labels().unwrap();
        assert_eq!((labels[0].from, labels[0].to, labels[0].class_id), (0.0, 1.0, 0));
        assert_eq!((labels[1].class_id, labels[1].confidence), (1, 0.4));
    }

    #[test]
    fn test_segments_by_column_index_with_fixed_confidence() {
        let table = CsvTable::parse("0,1,hello world\n1,2,again\n", ',', false).unwrap();
        let mut anno = Annotation::new();
        anno.set_free_scheme("transcription");

        let added = anno
            .add_segments_from_csv(&table, 0usize, 1usize, 2usize, 0.5f32)
            .unwrap();

        assert_eq!(added, 2);
        let labels = anno.free_labels().unwrap();
        assert_eq!(labels[0].name, "hello world");
        assert_eq!(labels[1].confidence, 0.5);
    }

    #[test]
    fn test_invalid_columns_are_rejected_up_front() {
        let table = create_test_table();
        let mut anno = create_test_annotation();

        assert!(matches!(
            anno.add_segments_from_csv(&table, 0usize, 1usize, 7usize, 1.0f32),
            Err(AnnotationError::InvalidColumn { columns: 4, .. })
        ));
        assert!(matches!(
            anno.add_segments_from_csv(&table, "start", "stop", "label", 1.0f32),
            Err(AnnotationError::InvalidColumn { .. })
        ));

        let headless = CsvTable::parse("0;1;happy\n", ';', false).unwrap();
        assert!(matches!(
            anno.add_segments_from_csv(&headless, "start", "end", "label", 1.0f32),
            Err(AnnotationError::MissingHeader)
        ));
        assert!(anno.is_empty());
    }

    #[test]
    fn test_scores_from_csv() {
        let table = CsvTable::parse("score\tconf\n0.25\t1\n0.5\t0.5\nnan\t0.1\n", '\t', true)
            .unwrap();
        let mut anno = Annotation::new();
        anno.set_continuous_scheme("arousal", 25.0, 0.0, 1.0).unwrap();

        assert_eq!(anno.add_scores_from_csv(&table, "score", "conf").unwrap(), 3);
        assert_eq!(anno.add_scores_from_csv(&table, 0usize, 0.75f32).unwrap(), 3);

        let labels = anno.continuous_labels().unwrap();
        assert_eq!(labels.len(), 6);
        assert_eq!((labels[1].score, labels[1].confidence), (0.5, 0.5));
        assert!(labels[2].score.is_nan());
        assert_eq!(labels[5].confidence, 0.75);
    }

    #[test]
    fn test_scheme_type_is_checked() {
        let table = create_test_table();
        let mut anno = create_test_annotation();
        assert!(anno.add_scores_from_csv(&table, 0usize, 1usize).is_err());

        let mut continuous = Annotation::new();
        continuous.set_continuous_scheme("arousal", 25.0, 0.0, 1.0).unwrap();
        assert!(continuous
            .add_segments_from_csv(&table, 0usize, 1usize, 2usize, 3usize)
            .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "from,to,class\n0,2,sad\n").unwrap();

        let table = CsvTable::load(&path, ',', true).unwrap();
        let mut anno = create_test_annotation();
        anno.add_segments_from_csv(&table, "from", "to", "class", 1.0f32)
            .unwrap();

        assert_eq!(anno.discrete_labels().unwrap()[0].class_id, 1);
        assert!(CsvTable::load(dir.path().join("missing.csv"), ',', true).is_err());
    }
}
