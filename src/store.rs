use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use directories::BaseDirs;

use crate::domain::{DocType, Entity};
use crate::error::FilingError;

/// Filesystem layout:
///
/// ```text
/// {data_root}/index/doc_index.tsv.gz
/// {data_root}/codes/EdinetcodeDlInfo.csv
/// {data_root}/reports/{entity_id}_{display_name}/{doc_type_label}/{date}_{doc_type_label}.csv
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, FilingError> {
        let data_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("edinet-filing-manager")).ok()
            })
            .ok_or_else(|| FilingError::Filesystem("unable to resolve data directory".to_string()))?;
        Ok(Self { data_root })
    }

    pub fn new_with_root(data_root: Utf8PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn index_path(&self) -> Utf8PathBuf {
        self.data_root.join("index").join("doc_index.tsv.gz")
    }

    pub fn code_list_dir(&self) -> Utf8PathBuf {
        self.data_root.join("codes")
    }

    pub fn code_list_zip_path(&self) -> Utf8PathBuf {
        self.code_list_dir().join("Edinetcode.zip")
    }

    pub fn code_list_csv_path(&self) -> Utf8PathBuf {
        self.code_list_dir().join("EdinetcodeDlInfo.csv")
    }

    pub fn reports_root(&self) -> Utf8PathBuf {
        self.data_root.join("reports")
    }

    pub fn entity_dir(&self, entity: &Entity) -> Utf8PathBuf {
        let folder = format!(
            "{}_{}",
            entity.entity_id.as_str(),
            sanitize_component(&entity.display_name)
        );
        self.reports_root().join(folder)
    }

    pub fn document_path(&self, entity: &Entity, doc_type: DocType, date: NaiveDate) -> Utf8PathBuf {
        self.entity_dir(entity)
            .join(doc_type.label())
            .join(format!("{}_{}.csv", date.format("%Y-%m-%d"), doc_type.label()))
    }

    pub fn ensure_data_root(&self) -> Result<(), FilingError> {
        fs::create_dir_all(self.data_root.as_std_path())
            .map_err(|err| FilingError::Filesystem(err.to_string()))
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), FilingError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| FilingError::Filesystem(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), FilingError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Display names land in directory names; keep them portable.
pub fn sanitize_component(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => cleaned.push('_'),
            ch if ch.is_whitespace() => cleaned.push('_'),
            ch if ch.is_control() => {}
            ch => cleaned.push(ch),
        }
    }
    if cleaned.is_empty() {
        cleaned.push('_');
    }
    cleaned
}
