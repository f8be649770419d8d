use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};

use camino::Utf8Path;
use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::domain::{DocId, DocType, EntityId};
use crate::error::FilingError;
use crate::store::Store;

const HEADER: &str = "date\tentity_id\tdoc_type\tdoc_id";

/// One row of the filing index: a document of `doc_type` exists for
/// `entity_id`, published on `date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub date: NaiveDate,
    pub entity_id: EntityId,
    pub doc_type: DocType,
    pub doc_id: DocId,
}

impl IndexEntry {
    fn key(&self) -> (NaiveDate, EntityId, DocType) {
        (self.date, self.entity_id.clone(), self.doc_type)
    }
}

/// The persisted filing index: deduplicated, sorted ascending by date.
///
/// Persisted as a single gzip-compressed TSV file. The file is rewritten
/// wholesale on every merge; the write goes through a temp file so an
/// interrupted run leaves the previous index intact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilingIndex {
    entries: Vec<IndexEntry>,
}

impl FilingIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// Reads the persisted index. A missing file is an empty index; a
    /// read or parse error is returned to the caller, which treats it as
    /// "no cache" and falls back to a full-lookback resynchronization.
    pub fn load(path: &Utf8Path) -> Result<Self, FilingError> {
        let file = match fs::File::open(path.as_std_path()) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(FilingError::Filesystem(err.to_string())),
        };
        let mut text = String::new();
        GzDecoder::new(file)
            .read_to_string(&mut text)
            .map_err(|err| FilingError::IndexParse(err.to_string()))?;
        Self::parse_tsv(&text)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), FilingError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(self.to_tsv().as_bytes())
            .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(path, &compressed)
    }

    /// Combines this index with newly fetched rows. Duplicates keyed by
    /// `(date, entity_id, doc_type)` keep the last occurrence, so an
    /// incoming row supersedes an existing one with the same key. The
    /// result is sorted ascending by date. Merging the same batch twice
    /// yields the same index as merging it once.
    pub fn merge(self, incoming: Vec<IndexEntry>) -> Self {
        let mut map = BTreeMap::new();
        for entry in self.entries.into_iter().chain(incoming) {
            map.insert(entry.key(), entry);
        }
        Self {
            entries: map.into_values().collect(),
        }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.entries.iter().map(|entry| entry.date).max()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.entries.iter().map(|entry| entry.date).min()
    }

    /// Rows for one entity and document type, ascending by date.
    pub fn entries_for(&self, entity_id: &EntityId, doc_type: DocType) -> Vec<IndexEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.entity_id == *entity_id && entry.doc_type == doc_type)
            .cloned()
            .collect()
    }

    pub fn has_date_on_or_after(&self, date: NaiveDate) -> bool {
        self.entries.iter().any(|entry| entry.date >= date)
    }

    pub fn check_well_formed(&self) -> Result<(), FilingError> {
        for entry in &self.entries {
            if entry.entity_id.as_str().is_empty() || entry.doc_id.as_str().is_empty() {
                return Err(FilingError::CacheIntegrity(format!(
                    "row with missing fields at date {}",
                    entry.date
                )));
            }
        }
        Ok(())
    }

    pub fn status(&self) -> StatusReport {
        let mut doc_type_counts = BTreeMap::new();
        for entry in &self.entries {
            *doc_type_counts
                .entry(entry.doc_type.code().to_string())
                .or_insert(0usize) += 1;
        }
        StatusReport {
            rows: self.entries.len(),
            first_date: self.min_date().map(|date| date.to_string()),
            last_date: self.max_date().map(|date| date.to_string()),
            doc_type_counts,
        }
    }

    fn to_tsv(&self) -> String {
        let mut out = String::with_capacity(32 * (self.entries.len() + 1));
        out.push_str(HEADER);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                entry.date.format("%Y-%m-%d"),
                entry.entity_id,
                entry.doc_type.code(),
                entry.doc_id
            ));
        }
        out
    }

    fn parse_tsv(text: &str) -> Result<Self, FilingError> {
        let mut lines = text.lines();
        match lines.next() {
            Some(line) if line == HEADER => {}
            other => {
                return Err(FilingError::IndexParse(format!(
                    "unexpected header: {:?}",
                    other.unwrap_or_default()
                )));
            }
        }

        let mut entries = Vec::new();
        for (number, line) in lines.enumerate() {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 4 {
                return Err(FilingError::IndexParse(format!(
                    "line {}: expected 4 fields, got {}",
                    number + 2,
                    fields.len()
                )));
            }
            let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d")
                .map_err(|_| FilingError::IndexParse(format!("line {}: bad date", number + 2)))?;
            entries.push(IndexEntry {
                date,
                entity_id: fields[1].parse()?,
                doc_type: fields[2].parse()?,
                doc_id: fields[3].parse()?,
            });
        }
        Ok(Self { entries })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub rows: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub doc_type_counts: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: &str, entity: &str, doc_type: DocType, doc_id: &str) -> IndexEntry {
        IndexEntry {
            date: date.parse().unwrap(),
            entity_id: entity.parse().unwrap(),
            doc_type,
            doc_id: doc_id.parse().unwrap(),
        }
    }

    #[test]
    fn merge_dedups_and_sorts() {
        let index = FilingIndex::new(vec![
            entry("2024-01-03", "6254", DocType::SecuritiesReport, "DOC3"),
            entry("2024-01-01", "6254", DocType::SecuritiesReport, "DOC1"),
        ]);
        let merged = index.merge(vec![
            entry("2024-01-02", "6254", DocType::SecuritiesReport, "DOC2"),
            entry("2024-01-02", "6254", DocType::SecuritiesReport, "DOC2"),
        ]);

        let dates: Vec<String> = merged
            .entries()
            .iter()
            .map(|entry| entry.date.to_string())
            .collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn merge_keeps_last_on_conflict() {
        let index = FilingIndex::new(vec![entry(
            "2024-01-01",
            "6254",
            DocType::SecuritiesReport,
            "OLD1",
        )]);
        let merged = index.merge(vec![entry(
            "2024-01-01",
            "6254",
            DocType::SecuritiesReport,
            "NEW1",
        )]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.entries()[0].doc_id.as_str(), "NEW1");
    }

    #[test]
    fn merge_is_idempotent() {
        let base = FilingIndex::new(vec![entry(
            "2024-01-01",
            "6254",
            DocType::SecuritiesReport,
            "DOC1",
        )]);
        let batch = vec![
            entry("2024-01-02", "7203", DocType::QuarterlyReport, "DOC2"),
            entry("2024-01-01", "6254", DocType::SecuritiesReport, "DOC9"),
        ];
        let once = base.clone().merge(batch.clone());
        let twice = once.clone().merge(batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_empty_batch_is_noop() {
        let index = FilingIndex::new(vec![entry(
            "2024-01-01",
            "6254",
            DocType::SecuritiesReport,
            "DOC1",
        )]);
        let merged = index.clone().merge(Vec::new());
        assert_eq!(index, merged);
    }

    #[test]
    fn round_trip_through_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("doc_index.tsv.gz")).unwrap();

        let index = FilingIndex::new(vec![
            entry("2024-01-01", "6254", DocType::SecuritiesRegistration, "DOC1"),
            entry("2024-01-02", "7203", DocType::QuarterlyReport, "DOC2"),
        ]);
        index.save(&path).unwrap();

        let loaded = FilingIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("missing.tsv.gz")).unwrap();
        let loaded = FilingIndex::load(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_corrupt_file_errors() {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("bad.tsv.gz")).unwrap();
        std::fs::write(path.as_std_path(), b"not gzip at all").unwrap();
        assert!(FilingIndex::load(&path).is_err());
    }

    #[test]
    fn entries_for_filters_and_orders() {
        let index = FilingIndex::new(vec![
            entry("2024-01-01", "6254", DocType::SecuritiesReport, "DOC1"),
            entry("2024-01-03", "6254", DocType::QuarterlyReport, "DOC3"),
            entry("2024-01-02", "7203", DocType::SecuritiesReport, "DOC2"),
        ])
        .merge(Vec::new());

        let entity: EntityId = "6254".parse().unwrap();
        let rows = index.entries_for(&entity, DocType::SecuritiesReport);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_id.as_str(), "DOC1");
    }

    #[test]
    fn status_counts_per_type() {
        let index = FilingIndex::new(vec![
            entry("2024-01-01", "6254", DocType::SecuritiesReport, "DOC1"),
            entry("2024-01-02", "6254", DocType::SecuritiesReport, "DOC2"),
            entry("2024-01-03", "6254", DocType::QuarterlyReport, "DOC3"),
        ]);
        let status = index.status();
        assert_eq!(status.rows, 3);
        assert_eq!(status.first_date.as_deref(), Some("2024-01-01"));
        assert_eq!(status.last_date.as_deref(), Some("2024-01-03"));
        assert_eq!(status.doc_type_counts.get("120"), Some(&2));
        assert_eq!(status.doc_type_counts.get("140"), Some(&1));
    }
}
