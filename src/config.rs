use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::DocType;
use crate::error::FilingError;

pub const DEFAULT_CONFIG_FILE: &str = "edinet-fm.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub lookback_years: Option<i32>,
    #[serde(default)]
    pub recency_window_days: Option<i64>,
    #[serde(default)]
    pub retrieval_window_years: Option<i32>,
    #[serde(default)]
    pub doc_types: Option<Vec<String>>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_root: Option<Utf8PathBuf>,
    pub lookback_years: i32,
    pub recency_window_days: i64,
    pub retrieval_window_years: i32,
    pub doc_types: Vec<DocType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            data_root: None,
            lookback_years: 10,
            recency_window_days: 7,
            retrieval_window_years: 10,
            doc_types: DocType::all().to_vec(),
            start_date: None,
            end_date: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the JSON config. An explicit path must exist; the default
    /// `edinet-fm.json` is optional and its absence yields the built-in
    /// defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FilingError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FilingError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FilingError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FilingError> {
        let defaults = ResolvedConfig::default();

        let doc_types = match config.doc_types {
            None => defaults.doc_types,
            Some(codes) => codes
                .iter()
                .map(|code| code.parse())
                .collect::<Result<Vec<DocType>, FilingError>>()?,
        };

        Ok(ResolvedConfig {
            data_root: config.data_root.map(Utf8PathBuf::from),
            lookback_years: config.lookback_years.unwrap_or(defaults.lookback_years),
            recency_window_days: config
                .recency_window_days
                .unwrap_or(defaults.recency_window_days),
            retrieval_window_years: config
                .retrieval_window_years
                .unwrap_or(defaults.retrieval_window_years),
            doc_types,
            start_date: parse_date(config.start_date)?,
            end_date: parse_date(config.end_date)?,
        })
    }
}

fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>, FilingError> {
    value
        .map(|text| {
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map_err(|_| FilingError::InvalidDate(text))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.lookback_years, 10);
        assert_eq!(resolved.recency_window_days, 7);
        assert_eq!(resolved.doc_types, DocType::all().to_vec());
        assert_eq!(resolved.start_date, None);
    }

    #[test]
    fn doc_types_parse_from_codes() {
        let config = Config {
            doc_types: Some(vec!["030".to_string(), "140".to_string()]),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(
            resolved.doc_types,
            vec![DocType::SecuritiesRegistration, DocType::QuarterlyReport]
        );
    }

    #[test]
    fn unknown_doc_type_is_rejected() {
        let config = Config {
            doc_types: Some(vec!["777".to_string()]),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, FilingError::InvalidDocType(_));
    }

    #[test]
    fn bad_date_is_rejected() {
        let config = Config {
            start_date: Some("2024/01/01".to_string()),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, FilingError::InvalidDate(_));
    }
}
