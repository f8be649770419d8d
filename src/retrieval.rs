use std::collections::BTreeMap;
use std::fs;

use camino::Utf8PathBuf;
use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;

use crate::cache::FilingIndex;
use crate::domain::{DocType, Entity, EntityCode, EntityId};
use crate::edinet::{DocumentClient, extract_csv_payload};
use crate::error::FilingError;
use crate::store::Store;
use crate::sync::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub doc_type: DocType,
    pub window_years: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            doc_type: DocType::SecuritiesRegistration,
            window_years: 10,
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityRetrieval {
    pub entity_id: String,
    pub matched: usize,
    pub saved: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    pub doc_type: String,
    pub entities: Vec<EntityRetrieval>,
    pub saved: usize,
    pub failed: usize,
}

/// Second stage: walks every resolved entity, picks its index rows for
/// the requested document type inside the date window, fetches each
/// document archive and persists the extracted payload. One failed
/// document never aborts the entity or the batch.
pub struct DocumentRetriever<D: DocumentClient> {
    store: Store,
    client: D,
    options: RetrievalOptions,
}

impl<D: DocumentClient> DocumentRetriever<D> {
    pub fn new(store: Store, client: D, options: RetrievalOptions) -> Self {
        Self {
            store,
            client,
            options,
        }
    }

    pub fn client(&self) -> &D {
        &self.client
    }

    pub fn run(
        &self,
        index: &FilingIndex,
        entities: &BTreeMap<EntityCode, Entity>,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalReport, FilingError> {
        if let (Some(start), Some(end)) = (self.options.start_date, self.options.end_date) {
            if start > end {
                return Err(FilingError::InvalidDateRange(format!("{start} > {end}")));
            }
        }

        let mut report = RetrievalReport {
            doc_type: self.options.doc_type.code().to_string(),
            entities: Vec::new(),
            saved: 0,
            failed: 0,
        };
        for entity in entities.values() {
            let entity_report = self.retrieve_entity(entity, index, sink)?;
            report.saved += entity_report.saved;
            report.failed += entity_report.failed;
            report.entities.push(entity_report);
        }
        Ok(report)
    }

    fn retrieve_entity(
        &self,
        entity: &Entity,
        index: &FilingIndex,
        sink: &dyn ProgressSink,
    ) -> Result<EntityRetrieval, FilingError> {
        let doc_type = self.options.doc_type;
        let rows = index.entries_for(&entity.entity_id, doc_type);
        if rows.is_empty() {
            sink.event(ProgressEvent {
                message: format!(
                    "retrieval.no_documents entity={} doc_type={}",
                    entity.entity_id,
                    doc_type.code()
                ),
                elapsed: None,
            });
            return Ok(EntityRetrieval {
                entity_id: entity.entity_id.to_string(),
                matched: 0,
                saved: 0,
                failed: 0,
            });
        }

        let (start, end) = retrieval_window(rows[0].date, &self.options);
        let selected: Vec<_> = rows
            .into_iter()
            .filter(|row| start <= row.date && row.date <= end)
            .collect();

        let mut saved = 0usize;
        let mut failed = 0usize;
        for row in &selected {
            match self.client.fetch_document(&row.doc_id, row.date) {
                Ok(archive) => match extract_csv_payload(&archive) {
                    Some(payload) if !payload.is_empty() => {
                        let path = self.store.document_path(entity, doc_type, row.date);
                        Store::write_bytes_atomic(&path, &payload)?;
                        saved += 1;
                        sink.event(ProgressEvent {
                            message: format!("document.saved path={path}"),
                            elapsed: None,
                        });
                    }
                    _ => {
                        failed += 1;
                        sink.event(ProgressEvent {
                            message: format!(
                                "document.unreadable entity={} doc_id={} date={}",
                                entity.entity_id, row.doc_id, row.date
                            ),
                            elapsed: None,
                        });
                    }
                },
                Err(err) => {
                    failed += 1;
                    sink.event(ProgressEvent {
                        message: format!(
                            "document.fetch_failed entity={} doc_id={} date={} error={err}",
                            entity.entity_id, row.doc_id, row.date
                        ),
                        elapsed: None,
                    });
                }
            }
        }

        Ok(EntityRetrieval {
            entity_id: entity.entity_id.to_string(),
            matched: selected.len(),
            saved,
            failed,
        })
    }
}

/// Explicit caller dates win; otherwise the window opens at the oldest
/// matching filing and spans the configured number of years.
pub fn retrieval_window(oldest: NaiveDate, options: &RetrievalOptions) -> (NaiveDate, NaiveDate) {
    match (options.start_date, options.end_date) {
        (Some(start), Some(end)) => (start, end),
        _ => (
            oldest,
            oldest + Duration::days(365 * i64::from(options.window_years)),
        ),
    }
}

/// Locates a persisted report file for an entity by scanning the output
/// layout, parsing the `YYYY-MM-DD_` prefix of each file name. Returns
/// the oldest file, or the newest when `latest` is set.
pub fn find_report_path(
    store: &Store,
    entity_id: &EntityId,
    latest: bool,
) -> Result<Option<Utf8PathBuf>, FilingError> {
    let reports_root = store.reports_root();
    if !reports_root.as_std_path().exists() {
        return Ok(None);
    }
    let folder_re = Regex::new(&format!("^{}_", entity_id.as_str())).unwrap();
    let date_re = Regex::new(r"^(\d{4}-\d{2}-\d{2})_").unwrap();

    let mut found: Vec<(NaiveDate, Utf8PathBuf)> = Vec::new();
    let entity_dirs = fs::read_dir(reports_root.as_std_path())
        .map_err(|err| FilingError::Filesystem(err.to_string()))?;
    for entity_dir in entity_dirs {
        let entity_dir = entity_dir.map_err(|err| FilingError::Filesystem(err.to_string()))?;
        let name = entity_dir.file_name().to_string_lossy().to_string();
        if !entity_dir.path().is_dir() || !folder_re.is_match(&name) {
            continue;
        }
        for doc_type in DocType::all() {
            let type_dir = entity_dir.path().join(doc_type.label());
            if !type_dir.exists() {
                continue;
            }
            let files =
                fs::read_dir(&type_dir).map_err(|err| FilingError::Filesystem(err.to_string()))?;
            for file in files {
                let file = file.map_err(|err| FilingError::Filesystem(err.to_string()))?;
                let file_name = file.file_name().to_string_lossy().to_string();
                let Some(captures) = date_re.captures(&file_name) else {
                    continue;
                };
                let Ok(date) = captures[1].parse::<NaiveDate>() else {
                    continue;
                };
                if let Ok(path) = Utf8PathBuf::from_path_buf(file.path()) {
                    found.push((date, path));
                }
            }
        }
    }

    found.sort_by_key(|(date, _)| *date);
    let pick = if latest {
        found.into_iter().next_back()
    } else {
        found.into_iter().next()
    };
    Ok(pick.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> NaiveDate {
        value.parse().unwrap()
    }

    #[test]
    fn window_defaults_to_oldest_plus_years() {
        let options = RetrievalOptions {
            window_years: 2,
            ..RetrievalOptions::default()
        };
        let (start, end) = retrieval_window(date("2020-03-01"), &options);
        assert_eq!(start, date("2020-03-01"));
        assert_eq!(end, date("2020-03-01") + Duration::days(730));
    }

    #[test]
    fn window_uses_explicit_bounds_when_both_given() {
        let options = RetrievalOptions {
            start_date: Some(date("2022-01-01")),
            end_date: Some(date("2023-01-01")),
            ..RetrievalOptions::default()
        };
        let (start, end) = retrieval_window(date("2020-03-01"), &options);
        assert_eq!(start, date("2022-01-01"));
        assert_eq!(end, date("2023-01-01"));
    }

    #[test]
    fn window_derives_when_only_one_bound_given() {
        let options = RetrievalOptions {
            start_date: Some(date("2022-01-01")),
            window_years: 1,
            ..RetrievalOptions::default()
        };
        let (start, _) = retrieval_window(date("2020-03-01"), &options);
        assert_eq!(start, date("2020-03-01"));
    }

    #[test]
    fn find_report_path_picks_oldest_and_newest() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_root(root);
        let entity = Entity {
            entity_id: "6254".parse().unwrap(),
            display_name: "Example".to_string(),
        };
        for day in ["2021-06-01", "2020-06-01", "2022-06-01"] {
            let path = store.document_path(&entity, DocType::SecuritiesRegistration, date(day));
            Store::write_bytes_atomic(&path, b"payload").unwrap();
        }

        let entity_id: EntityId = "6254".parse().unwrap();
        let oldest = find_report_path(&store, &entity_id, false).unwrap().unwrap();
        assert!(oldest.file_name().unwrap().starts_with("2020-06-01"));
        let newest = find_report_path(&store, &entity_id, true).unwrap().unwrap();
        assert!(newest.file_name().unwrap().starts_with("2022-06-01"));
    }

    #[test]
    fn find_report_path_without_reports_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_root(root);
        let entity_id: EntityId = "6254".parse().unwrap();
        assert_eq!(find_report_path(&store, &entity_id, false).unwrap(), None);
    }
}
