//! Recorded capture input for `headpose replay`.
//!
//! One JSON [`RawFrame`] per line; blank lines and lines starting with `#`
//! are skipped.  `captured_at` may be omitted and is then stamped on read.

use std::io::BufRead;

use headpose_types::RawFrame;

/// Iterate over the frames in `reader`.
///
/// Every item is either a frame or a message naming the offending line.
pub fn frames<R: BufRead>(reader: R) -> impl Iterator<Item = Result<RawFrame, String>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line_no = idx + 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(format!("line {line_no}: {e}"))),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            Some(
                serde_json::from_str::<RawFrame>(trimmed)
                    .map_err(|e| format!("line {line_no}: {e}")),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_frames_and_skips_comments() {
        let input = r#"# recorded at the bench
{"markers": [{"x": 0.0, "y": 0.0, "z": 1.0}, {"x": 1.0, "y": 0.0, "z": 1.0}]}

{"markers": [], "captured_at": "2026-01-01T00:00:00Z"}
"#;
        let frames: Vec<_> = frames(Cursor::new(input)).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().expect("frame").markers.len(), 2);
        assert!(frames[1].as_ref().expect("frame").markers.is_empty());
    }

    #[test]
    fn bad_line_reports_its_number() {
        let input = "{\"markers\": []}\nnot json\n";
        let results: Vec<_> = frames(Cursor::new(input)).collect();
        assert!(results[0].is_ok());
        let err = results[1].as_ref().expect_err("bad line");
        assert!(err.starts_with("line 2:"), "{err}");
    }
}
