//! Parser for `p4 -ztag` output.
//!
//! Tagged output is one field per line, `... <key> <value>`, with a blank
//! line between records. Lines without the `... ` prefix continue the value
//! of the previous field (multi-line descriptions).
//!
//! Multi-line values are printed verbatim and may contain blank lines
//! themselves, so a blank line only ends a record when the next field repeats
//! a key the record already holds.

use log::debug;

use super::Record;

const FIELD_PREFIX: &str = "... ";

/// Incremental parser, fed one line at a time.
#[derive(Debug, Default)]
pub struct ZtagParser {
    current: Record,
    last_key: Option<String>,
    blank_lines: usize,
}

impl ZtagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a record when the line starts the next one.
    pub fn feed(&mut self, line: &str) -> Option<Record> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            if !self.current.is_empty() {
                self.blank_lines += 1;
            }
            return None;
        }
        let blank_lines = std::mem::take(&mut self.blank_lines);

        if let Some(field) = line.strip_prefix(FIELD_PREFIX) {
            let (key, value) = field.split_once(' ').unwrap_or((field, ""));
            let finished = if blank_lines > 0 && self.current.get(key).is_some() {
                self.take()
            } else {
                None
            };
            self.current.insert(key, value);
            self.last_key = Some(key.to_string());
            return finished;
        }

        match &self.last_key {
            Some(key) => {
                for _ in 0..blank_lines {
                    self.current.append_line(key, "");
                }
                self.current.append_line(key, line);
            }
            None => debug!("Ignoring untagged output: {}", line),
        }
        None
    }

    /// Flush the record in progress at end of output.
    pub fn finish(&mut self) -> Option<Record> {
        self.take()
    }

    fn take(&mut self) -> Option<Record> {
        self.last_key = None;
        self.blank_lines = 0;
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

/// Parse a complete block of tagged output.
pub fn parse(text: &str) -> Vec<Record> {
    let mut parser = ZtagParser::new();
    let mut records: Vec<Record> = text.lines().filter_map(|line| parser.feed(line)).collect();
    records.extend(parser.finish());
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiple_records() {
        let output = "\
... depotFile //depot/main/a.txt
... clientFile //ws/main/a.txt
... rev 3
... action edit

... depotFile //depot/main/b.txt
... clientFile //ws/main/b.txt
... rev 1
... action add
";
        let records = parse(output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("depotFile"), Some("//depot/main/a.txt"));
        assert_eq!(records[0].get("rev"), Some("3"));
        assert_eq!(records[1].get("action"), Some("add"));
    }

    #[test]
    fn test_parse_continuation_lines() {
        let output = "... Change 42\n... Description fix the build\nand the tests\n";
        let records = parse(output);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("Description"),
            Some("fix the build\nand the tests")
        );
    }

    #[test]
    fn test_parse_empty_value_and_crlf() {
        let output = "... clientName ws\r\n... otherOpen\r\n\r\n";
        let records = parse(output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("clientName"), Some("ws"));
        assert_eq!(records[0].get("otherOpen"), Some(""));
    }

    #[test]
    fn test_parse_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n").is_empty());
    }

    #[test]
    fn test_incremental_feed() {
        let mut parser = ZtagParser::new();
        assert!(parser.feed("... rev 2\n").is_none());
        assert!(parser.feed("\n").is_none());
        let record = parser.feed("... rev 3\n").unwrap();
        assert_eq!(record.get("rev"), Some("2"));
        assert_eq!(parser.finish().unwrap().get("rev"), Some("3"));
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_blank_lines_inside_a_value_stay_in_the_record() {
        let output = "\
... change 42
... desc Fix the build

Also the tests.

... status submitted
... depotFile0 //depot/a.c
... action0 edit
... rev0 4
";
        let records = parse(output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("desc"), Some("Fix the build\n\nAlso the tests."));
        assert_eq!(records[0].get("status"), Some("submitted"));
        assert_eq!(records[0].get("depotFile0"), Some("//depot/a.c"));
    }

    #[test]
    fn test_multi_paragraph_values_across_records() {
        let output = "\
... Change 1
... Description first

second

... Change 2
... Description only
";
        let records = parse(output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Description"), Some("first\n\nsecond"));
        assert_eq!(records[1].get("Change"), Some("2"));
    }
}
