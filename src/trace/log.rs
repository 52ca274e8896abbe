//! Capture log reader
//!
//! A capture has one line per clocked byte: the console's byte and the
//! adapter's byte in hex, separated by a tab.

use std::fs;
use std::path::Path;
use thiserror::Error;

use super::{TraceAnalyzer, TraceReport};
use crate::protocol::Side;

/// Capture log errors
#[derive(Error, Debug)]
pub enum TraceLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

pub type TraceLogResult<T> = Result<T, TraceLogError>;

/// Both channels of a capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub console: Vec<u8>,
    pub adapter: Vec<u8>,
}

impl Capture {
    pub fn load<P: AsRef<Path>>(path: P) -> TraceLogResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let capture: Capture = content.parse()?;
        tracing::info!("Loaded capture from {:?}", path.as_ref());
        Ok(capture)
    }

    pub fn len(&self) -> usize {
        self.console.len()
    }

    pub fn is_empty(&self) -> bool {
        self.console.is_empty()
    }

    pub fn analyzer(&self) -> TraceAnalyzer<'_> {
        TraceAnalyzer::new(&self.console, &self.adapter)
    }

    pub fn analyze(&self, initiator: Side) -> TraceReport {
        self.analyzer().with_initiator(initiator).analyze()
    }
}

fn parse_byte(field: Option<&str>, line: usize, channel: &str) -> TraceLogResult<u8> {
    let field = field.map(str::trim).unwrap_or_default();
    if field.is_empty() {
        return Err(TraceLogError::Parse {
            line,
            reason: format!("missing {} byte", channel),
        });
    }
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u8::from_str_radix(digits, 16).map_err(|e| TraceLogError::Parse {
        line,
        reason: format!("bad {} byte {:?}: {}", channel, field, e),
    })
}

impl std::str::FromStr for Capture {
    type Err = TraceLogError;

    fn from_str(s: &str) -> TraceLogResult<Self> {
        let mut capture = Capture::default();
        for (index, line) in s.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = index + 1;
            let mut fields = line.split('\t');
            let console = parse_byte(fields.next(), line_no, "console")?;
            let adapter = parse_byte(fields.next(), line_no, "adapter")?;
            if fields.next().is_some() {
                return Err(TraceLogError::Parse {
                    line: line_no,
                    reason: "expected two columns".to_string(),
                });
            }
            capture.console.push(console);
            capture.adapter.push(adapter);
        }
        Ok(capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_columns() {
        let capture: Capture = "99\tD2\n66\td2\n\n0x11\tD2\r\n".parse().unwrap();
        assert_eq!(capture.console, vec![0x99, 0x66, 0x11]);
        assert_eq!(capture.adapter, vec![0xD2, 0xD2, 0xD2]);
        assert_eq!(capture.len(), 3);
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = "99\tD2\nZZ\tD2\n".parse::<Capture>().unwrap_err();
        assert!(matches!(err, TraceLogError::Parse { line: 2, .. }));

        let err = "99\n".parse::<Capture>().unwrap_err();
        assert!(matches!(err, TraceLogError::Parse { line: 1, .. }));

        let err = "99\tD2\t00\n".parse::<Capture>().unwrap_err();
        assert!(matches!(err, TraceLogError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_load_and_analyze() {
        let mut frame = crate::protocol::encode(0x11, &[]).unwrap().to_vec();
        frame.extend_from_slice(&[0x80, 0x00]);
        let answers = [0xD2, 0xD2, 0xD2, 0xD2, 0xD2, 0xD2, 0xD2, 0xD2, 0x88, 0x91];

        let mut file = NamedTempFile::new().unwrap();
        for (console, adapter) in frame.iter().zip(answers.iter()) {
            writeln!(file, "{:02X}\t{:02X}", console, adapter).unwrap();
        }

        let capture = Capture::load(file.path()).unwrap();
        let report = capture.analyze(Side::Console);
        assert!(report.is_clean());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].frame.command, 0x11);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Capture::load("/nonexistent/capture.txt").unwrap_err();
        assert!(matches!(err, TraceLogError::Io(_)));
    }
}
