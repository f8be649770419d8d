use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::cache::{FilingIndex, IndexEntry};
use crate::domain::{DocType, Entity, EntityCode};
use crate::edinet::{FilingDescriptor, MetadataClient};
use crate::error::FilingError;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<StdDuration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub lookback_years: i32,
    pub recency_window_days: i64,
    pub tracked_types: Vec<DocType>,
    pub force: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            lookback_years: 10,
            recency_window_days: 7,
            tracked_types: DocType::all().to_vec(),
            force: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub up_to_date: bool,
    pub fetched_days: u32,
    pub failed_days: u32,
    pub new_rows: usize,
    pub total_rows: usize,
}

/// Drives one synchronization run: compute the missing date range,
/// fetch it day by day, merge the batch into the persisted index, then
/// validate the result. Sequential and restartable: a run killed at any
/// point resumes correctly on the next invocation because the merge is
/// idempotent and the resumption point is derived from the index itself.
pub struct SyncCoordinator<M: MetadataClient> {
    store: Store,
    client: M,
    options: SyncOptions,
}

impl<M: MetadataClient> SyncCoordinator<M> {
    pub fn new(store: Store, client: M, options: SyncOptions) -> Self {
        Self {
            store,
            client,
            options,
        }
    }

    pub fn client(&self) -> &M {
        &self.client
    }

    pub fn run(
        &self,
        entities: &BTreeMap<EntityCode, Entity>,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, FilingError> {
        let index_path = self.store.index_path();
        sink.event(ProgressEvent {
            message: "phase=Load; reading filing index".to_string(),
            elapsed: None,
        });
        let existing = match FilingIndex::load(&index_path) {
            Ok(index) => index,
            Err(err) => {
                sink.event(ProgressEvent {
                    message: format!("index.unreadable error={err}; resynchronizing from scratch"),
                    elapsed: None,
                });
                FilingIndex::default()
            }
        };

        let last_cached = if self.options.force {
            None
        } else {
            existing.max_date()
        };
        let Some((start, end)) = missing_range(last_cached, today, self.options.lookback_years)
        else {
            sink.event(ProgressEvent {
                message: "phase=Range; index already covers today".to_string(),
                elapsed: None,
            });
            return Ok(SyncReport {
                up_to_date: true,
                fetched_days: 0,
                failed_days: 0,
                new_rows: 0,
                total_rows: existing.len(),
            });
        };

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; missing range {start}..{end}"),
            elapsed: None,
        });
        let mut batch = Vec::new();
        let mut fetched_days = 0u32;
        let mut failed_days = 0u32;
        for day in DayRange::new(start, end) {
            match self.client.fetch_day_index(day) {
                Ok(descriptors) => {
                    fetched_days += 1;
                    batch.extend(select_descriptors(
                        day,
                        &descriptors,
                        entities,
                        &self.options.tracked_types,
                    ));
                }
                Err(err) => {
                    failed_days += 1;
                    sink.event(ProgressEvent {
                        message: format!("edinet.day_failed date={day} error={err}"),
                        elapsed: None,
                    });
                }
            }
        }

        let before = existing.len();
        let merged = if batch.is_empty() {
            sink.event(ProgressEvent {
                message: "phase=Merge; no new rows".to_string(),
                elapsed: None,
            });
            existing
        } else {
            sink.event(ProgressEvent {
                message: format!("phase=Merge; merging {} rows", batch.len()),
                elapsed: None,
            });
            let merged = existing.merge(batch);
            merged.save(&index_path)?;
            merged
        };

        sink.event(ProgressEvent {
            message: "phase=Validate; checking merged index".to_string(),
            elapsed: None,
        });
        validate_index(&merged, today, end, self.options.recency_window_days)?;

        let new_rows = merged.len() - before;
        Ok(SyncReport {
            up_to_date: new_rows == 0,
            fetched_days,
            failed_days,
            new_rows,
            total_rows: merged.len(),
        })
    }
}

/// The date range still missing from the index: the full lookback window
/// when no coverage exists, otherwise everything after the newest cached
/// date. `None` means the index already covers today.
pub fn missing_range(
    last_cached: Option<NaiveDate>,
    today: NaiveDate,
    lookback_years: i32,
) -> Option<(NaiveDate, NaiveDate)> {
    let start = match last_cached {
        Some(date) => date.succ_opt()?,
        None => today - Duration::days(365 * i64::from(lookback_years)),
    };
    (start <= today).then_some((start, today))
}

/// Lazy inclusive iterator over calendar days, ascending. Days are
/// produced one request at a time so a long backfill never materializes
/// the whole range.
pub struct DayRange {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl DayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            next: (start <= end).then_some(start),
            end,
        }
    }
}

impl Iterator for DayRange {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = if current < self.end {
            current.succ_opt()
        } else {
            None
        };
        Some(current)
    }
}

/// Keeps a day's descriptors that resolve to a tracked entity, carry a
/// tracked document type, and have a machine-readable payload. Anything
/// else is dropped without error.
pub fn select_descriptors(
    date: NaiveDate,
    descriptors: &[FilingDescriptor],
    entities: &BTreeMap<EntityCode, Entity>,
    tracked_types: &[DocType],
) -> Vec<IndexEntry> {
    descriptors
        .iter()
        .filter(|descriptor| descriptor.is_machine_readable)
        .filter_map(|descriptor| {
            let entity_code: EntityCode = descriptor.entity_code.parse().ok()?;
            let entity = entities.get(&entity_code)?;
            let doc_type: DocType = descriptor.doc_type_code.parse().ok()?;
            if !tracked_types.contains(&doc_type) {
                return None;
            }
            Some(IndexEntry {
                date,
                entity_id: entity.entity_id.clone(),
                doc_type,
                doc_id: descriptor.doc_id.parse().ok()?,
            })
        })
        .collect()
}

/// Post-merge integrity checks, short-circuiting on the first failure.
/// The recency check only applies when the fetched range reaches into
/// the trailing window; it catches a registry that silently answers
/// every request with an empty day.
pub fn validate_index(
    index: &FilingIndex,
    today: NaiveDate,
    missing_end: NaiveDate,
    recency_window_days: i64,
) -> Result<(), FilingError> {
    if index.is_empty() {
        return Err(FilingError::CacheIntegrity(
            "filing index is empty after merge".to_string(),
        ));
    }
    let window_start = today - Duration::days(recency_window_days);
    if missing_end >= window_start && !index.has_date_on_or_after(window_start) {
        return Err(FilingError::CacheIntegrity(format!(
            "no rows on or after {window_start}; day fetches may be failing silently"
        )));
    }
    index.check_well_formed()
}
