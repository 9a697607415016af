use serde_json::{json, Value};

pub const RAW_KEY: &str = "raw";
pub const ARTIFACT_ROOT_KEY: &str = "data";
pub const ARTIFACT_FILE_NAME: &str = "scraper_data.json";

/// The downloaded artifact, one value per non-empty NDJSON line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedArtifact {
    pub records: Vec<Value>,
    pub malformed_lines: usize,
}

impl ParsedArtifact {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_document(self) -> Value {
        Value::Array(self.records)
    }
}

/// Parses newline-delimited JSON line by line. A malformed line is kept as
/// `{"raw": <line>}` so one bad record never aborts the load.
pub fn parse_artifact(text: &str) -> ParsedArtifact {
    let mut parsed = ParsedArtifact::default();
    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => parsed.records.push(value),
            Err(_) => {
                parsed.malformed_lines += 1;
                parsed.records.push(json!({ RAW_KEY: line }));
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_line_is_isolated_in_order() {
        let parsed = parse_artifact("{\"a\":1}\nnot-json\n{\"b\":2}\n");
        assert_eq!(
            parsed.records,
            vec![json!({"a": 1}), json!({"raw": "not-json"}), json!({"b": 2})]
        );
        assert_eq!(parsed.malformed_lines, 1);
    }

    #[test]
    fn blank_lines_and_crlf_are_tolerated() {
        let parsed = parse_artifact("\r\n{\"a\":1}\r\n   \n\n[1,2]\r\noops\r\n");
        assert_eq!(
            parsed.records,
            vec![json!({"a": 1}), json!([1, 2]), json!({"raw": "oops"})]
        );
    }

    #[test]
    fn empty_input_yields_empty_document() {
        let parsed = parse_artifact("");
        assert!(parsed.is_empty());
        assert_eq!(parsed.into_document(), json!([]));
    }
}
