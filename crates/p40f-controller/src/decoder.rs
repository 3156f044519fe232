//! Offline translation of classification results into labels.
//!
//! A result line ends with either a miss marker or a comma-separated list
//! whose first element is the hexadecimal label id written by the matching
//! rule, e.g.
//!
//! ```text
//! [12:00:01.123] result_match hit 0x3,
//! [12:00:01.456] result_match miss
//! ```

use crate::error::{ControllerError, Result};
use itertools::Itertools;
use p0f_sigdb::{SignatureSource, UNKNOWN_LABEL};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::num::IntErrorKind;
use std::path::Path;
use tracing::debug;

/// Token marking a lookup that matched no rule.
pub const MISS_MARKER: &str = "miss";

/// Decoded result of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayLabel {
    /// Miss, or a label the index marks as unrecognized.
    Unknown,
    /// Free-text description taken from the label.
    Label(String),
}

impl fmt::Display for DisplayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayLabel::Unknown => f.write_str(UNKNOWN_LABEL),
            DisplayLabel::Label(label) => f.write_str(label),
        }
    }
}

/// Decodes result lines against a label index.
pub struct ResultDecoder<'a, S: SignatureSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: SignatureSource + ?Sized> ResultDecoder<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    fn decode_token(&self, token: &str) -> std::result::Result<DisplayLabel, String> {
        if token.contains(MISS_MARKER) {
            return Ok(DisplayLabel::Unknown);
        }
        let raw = token.split(',').next().unwrap_or_default();
        let hex = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        let id = match u32::from_str_radix(hex, 16) {
            Ok(id) => id,
            // Wider than any label id the index can hold.
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => return Ok(DisplayLabel::Unknown),
            Err(e) => return Err(format!("invalid label id '{}': {}", token, e)),
        };

        let label = self.source.label_for_id(id);
        if label.contains(UNKNOWN_LABEL) {
            return Ok(DisplayLabel::Unknown);
        }
        // Labels are "type:class:name:flavor"; keep name and flavor.
        let text = label.split(':').skip(2).join(" ");
        Ok(DisplayLabel::Label(text.trim().to_string()))
    }

    fn decode_numbered(&self, line_no: usize, line: &str) -> Result<Option<DisplayLabel>> {
        let Some(token) = line.split_whitespace().last() else {
            return Ok(None);
        };
        self.decode_token(token)
            .map(Some)
            .map_err(|message| ControllerError::Decode {
                line: line_no,
                message,
            })
    }

    /// Decodes a single line; blank lines yield `None`. Errors report line 1.
    pub fn decode_line(&self, line: &str) -> Result<Option<DisplayLabel>> {
        self.decode_numbered(1, line)
    }

    /// Lazily decodes every non-blank line of `reader`, in order.
    pub fn decode_all<R: BufRead + 'a>(
        &self,
        reader: R,
    ) -> impl Iterator<Item = Result<DisplayLabel>> + 'a {
        let decoder = ResultDecoder {
            source: self.source,
        };
        reader.lines().enumerate().filter_map(move |(idx, line)| {
            let line_no = idx + 1;
            match line {
                Ok(line) => decoder.decode_numbered(line_no, &line).transpose(),
                Err(e) => Some(Err(ControllerError::Decode {
                    line: line_no,
                    message: e.to_string(),
                })),
            }
        })
    }

    /// Opens `path` and decodes it lazily. Each call starts from the
    /// beginning of the file.
    pub fn decode_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<impl Iterator<Item = Result<DisplayLabel>> + 'a> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ControllerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Decoding result file");
        Ok(self.decode_all(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p0f_sigdb::SignatureDatabase;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const SIGDB: &str = include_str!("../../../testdata/p0f.sigdb.json");

    fn db() -> SignatureDatabase {
        SignatureDatabase::from_json_str(SIGDB).unwrap()
    }

    #[test]
    fn test_known_label() {
        let db = db();
        let decoder = ResultDecoder::new(&db);
        assert_eq!(
            decoder.decode_line("result_match hit 1,0").unwrap(),
            Some(DisplayLabel::Label("Linux 3.11 and newer".into()))
        );
        assert_eq!(
            decoder.decode_line("  0x3").unwrap().unwrap().to_string(),
            "Windows 7 or 8"
        );
    }

    #[test]
    fn test_miss_and_unknown_are_same_sentinel() {
        let db = db();
        let decoder = ResultDecoder::new(&db);
        let miss = decoder.decode_line("result_match miss").unwrap();
        let unrecognized = decoder.decode_line("result_match hit deadbeef,").unwrap();
        let unindexed = decoder.decode_line("hit 2a,").unwrap();
        assert_eq!(miss, Some(DisplayLabel::Unknown));
        assert_eq!(unrecognized, miss);
        assert_eq!(unindexed, miss);
        assert_eq!(miss.unwrap().to_string(), "???");
    }

    #[test]
    fn test_oversized_label_id_is_unknown() {
        let db = db();
        let decoder = ResultDecoder::new(&db);
        assert_eq!(
            decoder.decode_line("hit 1deadbeef,").unwrap(),
            Some(DisplayLabel::Unknown)
        );
        assert_eq!(
            decoder.decode_line("hit 0xffffffffffffffffffff").unwrap(),
            Some(DisplayLabel::Unknown)
        );
        let err = decoder.decode_line("hit 1deadbeeg,").unwrap_err();
        assert!(matches!(err, ControllerError::Decode { line: 1, .. }));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let db = db();
        let decoder = ResultDecoder::new(&db);
        let line = "table hit 2,0,0";
        assert_eq!(decoder.decode_line(line).unwrap(), decoder.decode_line(line).unwrap());
    }

    #[test]
    fn test_decode_all_skips_blank_lines_and_reports_line_numbers() {
        let db = db();
        let decoder = ResultDecoder::new(&db);
        let input = "hit 1,\n\n   \nmiss\nhit zz,\n";
        let results: Vec<_> = decoder.decode_all(Cursor::new(input)).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].as_ref().unwrap(), &DisplayLabel::Unknown);
        match &results[2] {
            Err(ControllerError::Decode { line, .. }) => assert_eq!(*line, 5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_path_is_restartable() {
        let db = db();
        let decoder = ResultDecoder::new(&db);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grep_result.txt");
        std::fs::write(&path, "hit 1,\nhit 2,\nmiss\n").unwrap();

        let first: Vec<String> = decoder
            .decode_path(&path)
            .unwrap()
            .map(|r| r.unwrap().to_string())
            .collect();
        let second: Vec<String> = decoder
            .decode_path(&path)
            .unwrap()
            .map(|r| r.unwrap().to_string())
            .collect();
        assert_eq!(first, vec!["Linux 3.11 and newer", "Linux 2.2.x-3.x", "???"]);
        assert_eq!(first, second);

        assert!(matches!(
            decoder.decode_path(dir.path().join("missing.txt")),
            Err(ControllerError::Io { .. })
        ));
    }
}
