//! Class id to label mapping.
//!
//! Label files hold one entry per line. Accepted forms:
//! - `"<index> <label>"`
//! - `"<index>  <label>"` (two spaces; the prefix is dropped even when it is not numeric)
//! - `"<label>"` (index is the zero-based line number)
//!
//! Lines that are blank after trimming leave their index without an entry.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::LabelLoadError;

/// Read-only mapping from class id to a non-empty, trimmed label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: BTreeMap<u32, String>,
}

impl LabelTable {
    /// Load a label file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LabelLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| LabelLoadError {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&raw);
        log::info!("loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parse label file contents.
    pub fn parse(contents: &str) -> Self {
        let mut labels = BTreeMap::new();
        for (line_no, line) in contents.lines().enumerate() {
            let Some((index, label)) = parse_line(line, line_no as u32) else {
                continue;
            };
            labels.insert(index, label);
        }
        Self { labels }
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let labels = entries
            .into_iter()
            .filter_map(|(id, label)| {
                let label = label.into().trim().to_string();
                (!label.is_empty()).then_some((id, label))
            })
            .collect();
        Self { labels }
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.labels.get(&class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn parse_line(line: &str, line_no: u32) -> Option<(u32, String)> {
    let trimmed = line.trim();

    let (index, label) = if let Some((prefix, rest)) = trimmed.split_once("  ") {
        let index = prefix.trim().parse::<u32>().unwrap_or(line_no);
        (index, rest.trim())
    } else if let Some((prefix, rest)) = trimmed.split_once(' ') {
        if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
            match prefix.parse::<u32>() {
                Ok(index) => (index, rest.trim()),
                Err(_) => (line_no, rest.trim()),
            }
        } else {
            (line_no, trimmed)
        }
    } else {
        (line_no, trimmed)
    };

    if label.is_empty() {
        None
    } else {
        Some((index, label.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn bare_labels_use_line_numbers() {
        let table = LabelTable::parse("person\nbicycle\ncar\n");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some("person"));
        assert_eq!(table.get(2), Some("car"));
    }

    #[test]
    fn single_and_double_space_prefixes_yield_same_label() {
        let single = LabelTable::parse("17 cat\n");
        let double = LabelTable::parse("17  cat\n");
        assert_eq!(single.get(17), Some("cat"));
        assert_eq!(double.get(17), Some("cat"));
    }

    #[test]
    fn multi_word_labels_keep_their_spaces() {
        let table = LabelTable::parse("traffic light\n9 fire hydrant\n");
        assert_eq!(table.get(0), Some("traffic light"));
        assert_eq!(table.get(9), Some("fire hydrant"));
    }

    #[test]
    fn blank_lines_leave_gaps() {
        let table = LabelTable::parse("person\n   \n???\n  \t\ncar\n");
        assert_eq!(table.get(0), Some("person"));
        assert_eq!(table.get(1), None);
        assert_eq!(table.get(2), Some("???"));
        assert_eq!(table.get(3), None);
        assert_eq!(table.get(4), Some("car"));
    }

    #[test]
    fn every_entry_is_trimmed_and_non_empty() {
        let table = LabelTable::parse("  dog  \n3   kite \n\n4 boat\t\n");
        for id in [0, 3, 4] {
            let label = table.get(id).expect("label present");
            assert!(!label.is_empty());
            assert_eq!(label, label.trim());
        }
    }

    #[test]
    fn load_reads_file_and_missing_file_fails() {
        let mut file = tempfile::NamedTempFile::new().expect("temp labels");
        file.write_all(b"0 person\n1 bicycle\n").expect("write labels");
        let table = LabelTable::load(file.path()).expect("load labels");
        assert_eq!(table.get(1), Some("bicycle"));

        let missing = file.path().with_extension("missing");
        let err = LabelTable::load(&missing).unwrap_err();
        assert_eq!(err.path, missing);
    }
}
