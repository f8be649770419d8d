use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FilingError {
    #[error("invalid entity code: {0}")]
    InvalidEntityCode(String),

    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),

    #[error("invalid document id: {0}")]
    InvalidDocId(String),

    #[error("unknown document type code: {0}")]
    InvalidDocType(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("EDINET_API_KEY is not set")]
    MissingApiKey,

    #[error("EDINET request failed: {0}")]
    EdinetHttp(String),

    #[error("EDINET returned status {status}: {message}")]
    EdinetStatus { status: u16, message: String },

    #[error("code list request failed: {0}")]
    CodeListHttp(String),

    #[error("code list returned status {status}: {message}")]
    CodeListStatus { status: u16, message: String },

    #[error("failed to parse code list: {0}")]
    CodeListParse(String),

    #[error("failed to parse filing index: {0}")]
    IndexParse(String),

    #[error("filing index integrity check failed: {0}")]
    CacheIntegrity(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
