//! Loading of invocation traces.
//!
//! A trace is comma-separated text with a header line. Every other line is a record with exactly
//! five fields:
//!
//! ```text
//! id,arrival,function,duration,unused
//! R1,0.0,F1,1.0,
//! R2,0.25,F2,0.5,
//! ```
//!
//! Arrival offset and duration are floating-point seconds. Rows with a different number of fields
//! or with unparseable numbers are skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Number of fields in a trace row.
const FIELDS: usize = 5;

/// A single invocation from the trace.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceRecord {
    /// Stable identifier correlating the row, its request and its result.
    pub id: String,
    /// Arrival time relative to the start of the trace.
    pub arrival_offset: Duration,
    /// The function that was invoked.
    pub function_id: String,
    /// Recorded duration of the invocation.
    pub total_duration: Duration,
}

/// Inclusive range of record indices to load.
///
/// Index `0` is the first line after the header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordRange {
    /// Index of the first record.
    pub first: usize,
    /// Index of the last record, or `None` for the end of the trace.
    pub last: Option<usize>,
}

impl RecordRange {
    /// Returns `true` if `index` lies within the range.
    pub fn contains(&self, index: usize) -> bool {
        index >= self.first && self.last.is_none_or(|last| index <= last)
    }
}

/// Errors from loading a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The trace file could not be read.
    #[error("failed to read trace file {path:?}")]
    Read {
        /// Path of the trace file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Reads the trace file at `path` and parses the records within `range`.
pub fn load(path: &Path, range: RecordRange) -> Result<Vec<TraceRecord>, TraceError> {
    let text = fs::read_to_string(path).map_err(|source| TraceError::Read {
        path: path.to_owned(),
        source,
    })?;

    Ok(parse(&text, range))
}

/// Parses the records within `range` from trace text.
///
/// Records keep the order of the trace. Lines that do not form a valid record still count towards
/// the index, so a range selects the same lines regardless of their contents.
pub fn parse(text: &str, range: RecordRange) -> Vec<TraceRecord> {
    text.lines()
        .skip(1)
        .enumerate()
        .filter(|(index, _)| range.contains(*index))
        .filter_map(|(index, line)| {
            let record = parse_row(line);
            if record.is_none() {
                tracing::trace!(index, line, "skipping malformed trace row");
            }
            record
        })
        .collect()
}

fn parse_row(line: &str) -> Option<TraceRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    let &[id, arrival, function_id, duration, _] = fields.as_slice() else {
        return None;
    };

    Some(TraceRecord {
        id: id.to_owned(),
        arrival_offset: parse_seconds(arrival)?,
        function_id: function_id.to_owned(),
        total_duration: parse_seconds(duration)?,
    })
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "\
id,arrival,function,duration,unused
R0,0.0,F1,1.0,
R1,0.5,F2,0.25,x
R2,0.5,F3
R3,1.5,F1,2.0,
";

    fn ids(records: &[TraceRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_parse_all() {
        let records = parse(TRACE, RecordRange::default());

        assert_eq!(ids(&records), ["R0", "R1", "R3"]);
        assert_eq!(
            records[0],
            TraceRecord {
                id: "R0".into(),
                arrival_offset: Duration::ZERO,
                function_id: "F1".into(),
                total_duration: Duration::from_secs(1),
            }
        );
        assert_eq!(records[1].arrival_offset, Duration::from_millis(500));
        assert_eq!(records[1].total_duration, Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let text = "header\nR1,0.0,F1,1.0,\nR2,0.0,F1\nR3,x,F1,1.0,\nR4,0.0,F1,-1.0,\n\n";
        let records = parse(text, RecordRange::default());
        assert_eq!(ids(&records), ["R1"]);
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = RecordRange {
            first: 1,
            last: Some(2),
        };
        // Index 2 is the malformed row, so only R1 remains.
        assert_eq!(ids(&parse(TRACE, range)), ["R1"]);

        let range = RecordRange {
            first: 1,
            last: None,
        };
        assert_eq!(ids(&parse(TRACE, range)), ["R1", "R3"]);

        let range = RecordRange {
            first: 10,
            last: None,
        };
        assert!(parse(TRACE, range).is_empty());
    }

    #[test]
    fn test_crlf_lines() {
        let records = parse("h\r\nR1,0.0,F1,1.0,\r\n", RecordRange::default());
        assert_eq!(ids(&records), ["R1"]);
    }

    #[test]
    fn test_missing_file() {
        let err = load(Path::new("/nonexistent/trace.csv"), RecordRange::default()).unwrap_err();
        assert!(matches!(err, TraceError::Read { .. }));
    }
}
