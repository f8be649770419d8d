use std::io::{Cursor, Read};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use zip::ZipArchive;

use crate::domain::DocId;
use crate::error::FilingError;

/// One filing as reported by the day index, before entity resolution
/// and type filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingDescriptor {
    pub entity_code: String,
    pub doc_type_code: String,
    pub doc_id: String,
    pub is_machine_readable: bool,
}

pub trait MetadataClient: Send + Sync {
    /// All filings published on one calendar day, system-wide. A day the
    /// registry has no data for is an empty list, not an error.
    fn fetch_day_index(&self, date: NaiveDate) -> Result<Vec<FilingDescriptor>, FilingError>;
}

pub trait DocumentClient: Send + Sync {
    /// The raw document archive for one filing.
    fn fetch_document(&self, doc_id: &DocId, date: NaiveDate) -> Result<Vec<u8>, FilingError>;
}

#[derive(Clone)]
pub struct EdinetHttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EdinetHttpClient {
    pub fn new(api_key: String) -> Result<Self, FilingError> {
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
            .map_err(|err| FilingError::EdinetHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: "https://api.edinet-fsa.go.jp/api/v2/documents".to_string(),
            api_key,
        })
    }

    pub fn from_env() -> Result<Self, FilingError> {
        let api_key = std::env::var("EDINET_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(FilingError::MissingApiKey)?;
        Self::new(api_key)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, FilingError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(FilingError::EdinetHttp(err.to_string()));
                }
            }
        }
    }
}

impl MetadataClient for EdinetHttpClient {
    fn fetch_day_index(&self, date: NaiveDate) -> Result<Vec<FilingDescriptor>, FilingError> {
        let url = format!("{}.json", self.base_url);
        let date_str = date.format("%Y-%m-%d").to_string();
        let response = self.send_with_retries(|| {
            self.client.get(&url).query(&[
                ("type", "2"),
                ("date", date_str.as_str()),
                ("Subscription-Key", self.api_key.as_str()),
            ])
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "EDINET request failed".to_string());
            return Err(FilingError::EdinetStatus { status, message });
        }
        let payload: DayIndexResponse = response
            .json()
            .map_err(|err| FilingError::EdinetHttp(err.to_string()))?;
        Ok(payload.into_descriptors())
    }
}

impl DocumentClient for EdinetHttpClient {
    fn fetch_document(&self, doc_id: &DocId, date: NaiveDate) -> Result<Vec<u8>, FilingError> {
        let url = format!("{}/{}", self.base_url, doc_id.as_str());
        let date_str = date.format("%Y-%m-%d").to_string();
        let response = self.send_with_retries(|| {
            self.client.get(&url).query(&[
                ("type", "5"),
                ("date", date_str.as_str()),
                ("Subscription-Key", self.api_key.as_str()),
            ])
        })?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "EDINET request failed".to_string());
            return Err(FilingError::EdinetStatus { status, message });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("octet-stream") {
            return Err(FilingError::EdinetStatus {
                status,
                message: format!("expected archive payload, got content type {content_type}"),
            });
        }
        let bytes = response
            .bytes()
            .map_err(|err| FilingError::EdinetHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// The document archive packs the machine-readable tables under
/// `XBRL_TO_CSV/`; the corporate-report payload is the first member
/// named `jpcrp*.csv`. Anything else, or an unreadable archive, is
/// treated as a failed fetch by the caller.
pub fn extract_csv_payload(archive: &[u8]) -> Option<Vec<u8>> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).ok()?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).ok()?;
        let name = entry.name().to_string();
        if name.starts_with("XBRL_TO_CSV/jpcrp") && name.ends_with(".csv") {
            let mut payload = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut payload).ok()?;
            return Some(payload);
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct DayIndexResponse {
    #[serde(default)]
    results: Option<Vec<RawFiling>>,
}

#[derive(Debug, Deserialize)]
struct RawFiling {
    #[serde(rename = "edinetCode")]
    edinet_code: Option<String>,
    #[serde(rename = "docTypeCode")]
    doc_type_code: Option<String>,
    #[serde(rename = "docID")]
    doc_id: Option<String>,
    #[serde(rename = "csvFlag")]
    csv_flag: Option<String>,
}

impl DayIndexResponse {
    fn into_descriptors(self) -> Vec<FilingDescriptor> {
        self.results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| {
                Some(FilingDescriptor {
                    entity_code: raw.edinet_code?,
                    doc_type_code: raw.doc_type_code?,
                    doc_id: raw.doc_id?,
                    is_machine_readable: raw.csv_flag.as_deref() == Some("1"),
                })
            })
            .collect()
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
