use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{Entity, EntityCode, EntityId};
use crate::error::FilingError;
use crate::fs_util;
use crate::store::Store;

const CODE_LIST_URL: &str =
    "https://disclosure2dl.edinet-fsa.go.jp/searchdocument/codelist/Edinetcode.zip";

const COL_ENTITY_CODE: &str = "ＥＤＩＮＥＴコード";
const COL_SECURITIES_CODE: &str = "証券コード";
const COL_FILER_NAME: &str = "提出者名";

pub trait CodeListClient: Send + Sync {
    fn download_code_list(&self, destination: &Path) -> Result<(), FilingError>;
}

#[derive(Clone)]
pub struct CodeListHttpClient {
    client: Client,
}

impl CodeListHttpClient {
    pub fn new() -> Result<Self, FilingError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("edinet-fm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FilingError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| FilingError::CodeListHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl CodeListClient for CodeListHttpClient {
    fn download_code_list(&self, destination: &Path) -> Result<(), FilingError> {
        let response = self
            .client
            .get(CODE_LIST_URL)
            .send()
            .map_err(|err| FilingError::CodeListHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "code list request failed".to_string());
            return Err(FilingError::CodeListStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| FilingError::CodeListHttp(err.to_string()))?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| FilingError::Filesystem(err.to_string()))?;
        }
        let mut file =
            fs::File::create(destination).map_err(|err| FilingError::Filesystem(err.to_string()))?;
        file.write_all(&bytes)
            .map_err(|err| FilingError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Downloads and parses the registry's master code list, yielding the
/// entities tracked this run. Built once per run; not persisted.
pub fn resolve_all<C: CodeListClient>(
    store: &Store,
    client: &C,
) -> Result<BTreeMap<EntityCode, Entity>, FilingError> {
    let zip_path = store.code_list_zip_path();
    let csv_path = store.code_list_csv_path();

    client.download_code_list(zip_path.as_std_path())?;
    fs_util::extract_zip(zip_path.as_std_path(), store.code_list_dir().as_std_path())?;
    let _ = fs::remove_file(zip_path.as_std_path());

    let csv_bytes = fs::read(csv_path.as_std_path())
        .map_err(|err| FilingError::CodeListParse(format!("read {csv_path}: {err}")))?;
    parse_code_list(&csv_bytes)
}

/// The master CSV is CP932-encoded, with a download-info preamble line
/// before the header. Rows with an empty securities-code column are
/// unlisted or delisted entities and are skipped, as is any row whose
/// codes fail validation.
pub fn parse_code_list(csv_bytes: &[u8]) -> Result<BTreeMap<EntityCode, Entity>, FilingError> {
    let (text, _, _) = encoding_rs::SHIFT_JIS.decode(csv_bytes);
    let mut lines = text.lines();

    let _preamble = lines
        .next()
        .ok_or_else(|| FilingError::CodeListParse("empty code list".to_string()))?;
    let header = lines
        .next()
        .ok_or_else(|| FilingError::CodeListParse("missing header".to_string()))?;
    let columns = split_csv_line(header);
    let code_idx = column_index(&columns, COL_ENTITY_CODE)?;
    let securities_idx = column_index(&columns, COL_SECURITIES_CODE)?;
    let name_idx = column_index(&columns, COL_FILER_NAME)?;

    let mut entities = BTreeMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let fields = split_csv_line(line);
        let securities_code = match fields.get(securities_idx) {
            Some(value) if !value.is_empty() => value,
            _ => continue,
        };
        let entity_code: EntityCode = match fields.get(code_idx).map(|value| value.parse()) {
            Some(Ok(code)) => code,
            _ => continue,
        };
        let entity_id = match EntityId::from_securities_code(securities_code) {
            Ok(id) => id,
            Err(_) => continue,
        };
        let display_name = fields.get(name_idx).cloned().unwrap_or_default();
        entities.insert(
            entity_code,
            Entity {
                entity_id,
                display_name,
            },
        );
    }
    Ok(entities)
}

fn column_index(columns: &[String], name: &str) -> Result<usize, FilingError> {
    columns
        .iter()
        .position(|column| column == name)
        .ok_or_else(|| FilingError::CodeListParse(format!("missing column {name}")))
}

/// Minimal quoted-CSV splitter: double quotes wrap fields, `""` escapes
/// a quote inside a quoted field.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            ch => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
