//! # Label Ledger
//!
//! Ordered class labels parallel to the vector store: label `i` belongs to
//! vector id `i`. Persisted as text, one label per line.

use std::fs;
use std::io::Write;
use std::path::Path;

use kagami_core::{KagamiError, Result, UNKNOWN_LABEL, VectorId};
use tracing::{debug, info, warn};

use crate::persist::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelLedger {
    labels: Vec<String>,
}

impl LabelLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects labels that would break the one-per-line file format.
    pub fn validate_label(label: &str) -> Result<()> {
        if label.is_empty() || label.contains(['\n', '\r']) {
            return Err(KagamiError::InvalidLabel(label.to_string()));
        }
        Ok(())
    }

    /// Append labels in order.
    ///
    /// Only called together with a vector add of the same size.
    pub fn append<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
    }

    /// Resolve ids to labels. Out-of-range ids resolve to `"Unknown"`.
    pub fn get(&self, ids: &[VectorId]) -> Vec<String> {
        ids.iter()
            .map(|&id| match self.label(id) {
                Some(label) => label.to_string(),
                None => {
                    warn!(id, len = self.labels.len(), "label id out of bounds");
                    UNKNOWN_LABEL.to_string()
                }
            })
            .collect()
    }

    /// Label for a single id.
    pub fn label(&self, id: VectorId) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Distinct labels in order of first appearance.
    pub fn classes(&self) -> Vec<String> {
        self.counts().into_iter().map(|(label, _)| label).collect()
    }

    /// Samples per label, in order of first appearance.
    pub fn counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for label in &self.labels {
            match counts.iter_mut().find(|(l, _)| l == label) {
                Some((_, n)) => *n += 1,
                None => counts.push((label.clone(), 1)),
            }
        }
        counts
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.labels.truncate(len);
    }

    /// Read a label file.
    ///
    /// Content that is not UTF-8 is reported as `CorruptIndex` for the
    /// label file, so callers recover from it like a damaged index.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let content = String::from_utf8(bytes).map_err(|e| KagamiError::CorruptIndex {
            path: path.to_path_buf(),
            reason: format!("label file is not UTF-8: {e}"),
        })?;
        let labels: Vec<String> = content
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        info!(path = %path.display(), labels = labels.len(), "loaded labels");
        Ok(Self { labels })
    }

    /// Atomically write the label file.
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            for label in &self.labels {
                writeln!(w, "{label}")?;
            }
            Ok(())
        })?;
        debug!(path = %path.display(), labels = self.labels.len(), "persisted labels");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(labels: &[&str]) -> LabelLedger {
        let mut l = LabelLedger::new();
        l.append(labels.iter().copied());
        l
    }

    #[test]
    fn get_resolves_in_order() {
        let l = ledger(&["cat", "dog", "cat"]);
        assert_eq!(l.get(&[2, 1, 0]), vec!["cat", "dog", "cat"]);
    }

    #[test]
    fn out_of_range_ids_are_unknown() {
        let l = ledger(&["cat", "dog"]);
        assert_eq!(l.get(&[l.len() as VectorId + 5]), vec![UNKNOWN_LABEL]);
        assert_eq!(l.get(&[-1, 0]), vec![UNKNOWN_LABEL, "cat"]);
    }

    #[test]
    fn classes_in_first_appearance_order() {
        let l = ledger(&["dog", "cat", "dog", "bird"]);
        assert_eq!(l.classes(), vec!["dog", "cat", "bird"]);
        assert_eq!(
            l.counts(),
            vec![
                ("dog".to_string(), 2),
                ("cat".to_string(), 1),
                ("bird".to_string(), 1)
            ]
        );
    }

    #[test]
    fn file_has_one_line_per_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.kgm.labels");

        let l = ledger(&["cat", "golden retriever", "cat"]);
        l.persist(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "cat\ngolden retriever\ncat\n"
        );
        assert_eq!(LabelLedger::load(&path).unwrap(), l);
    }

    #[test]
    fn crlf_files_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels");
        fs::write(&path, "cat\r\ndog\r\n").unwrap();
        assert_eq!(LabelLedger::load(&path).unwrap(), ledger(&["cat", "dog"]));
    }

    #[test]
    fn non_utf8_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels");
        fs::write(&path, b"c\xffat\n").unwrap();
        assert!(matches!(
            LabelLedger::load(&path),
            Err(KagamiError::CorruptIndex { path: p, .. }) if p == path
        ));
    }

    #[test]
    fn label_validation() {
        assert!(LabelLedger::validate_label("cat").is_ok());
        assert!(LabelLedger::validate_label("").is_err());
        assert!(LabelLedger::validate_label("a\nb").is_err());
    }
}
