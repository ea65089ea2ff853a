use std::fs;

use camino::Utf8Path;
use chrono::{NaiveTime, Timelike};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::BidsError;
use crate::fs_util::{self, WriteAction};

pub const INTENDED_FOR: &str = "IntendedFor";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sidecar {
    fields: Map<String, Value>,
}

impl Sidecar {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn read(path: &Utf8Path) -> Result<Self, BidsError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| BidsError::Filesystem(format!("read {path}: {err}")))?;
        let value: Value = serde_json::from_str(&content).map_err(|err| BidsError::JsonParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(BidsError::JsonParse {
                path: path.to_path_buf(),
                message: "top-level value is not an object".to_string(),
            }),
        }
    }

    pub fn read_or_empty(path: &Utf8Path) -> Self {
        match Self::read(path) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                warn!(path = %path, "sidecar unavailable, using empty metadata: {err}");
                Self::default()
            }
        }
    }

    pub fn write(&self, path: &Utf8Path, overwrite: bool) -> Result<WriteAction, BidsError> {
        let action = WriteAction::decide(path, overwrite);
        let name = path.file_name().unwrap_or_default();
        match action {
            WriteAction::Created => info!("creating new {name}"),
            WriteAction::Overwritten => info!("overwriting previous {name}"),
            WriteAction::Preserved => info!("preserving previous {name}"),
        }
        if action.writes() {
            let content = serde_json::to_vec_pretty(&self.fields)
                .map_err(|err| BidsError::Filesystem(err.to_string()))?;
            fs_util::write_bytes_atomic(path, &content)?;
        }
        Ok(action)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn series_description(&self) -> Option<String> {
        self.fields
            .get("SeriesDescription")
            .and_then(Value::as_str)
            .map(|value| value.trim().replace(' ', "_"))
    }

    pub fn acquisition_time(&self) -> Option<NaiveTime> {
        self.fields
            .get("AcquisitionTime")
            .and_then(Value::as_str)
            .and_then(parse_acquisition_time)
    }

    pub fn echo_number(&self) -> Option<u32> {
        self.fields
            .get("EchoNumber")
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
    }

    pub fn echo_time(&self) -> Option<f64> {
        self.fields.get("EchoTime").and_then(Value::as_f64)
    }

    pub fn image_type(&self) -> Vec<String> {
        match self.fields.get("ImageType") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(value)) => value.split('\\').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// `ScanningSequence` joined with `_`, the way dcm2niix renders `%q`.
    pub fn scanning_sequence(&self) -> Option<String> {
        match self.fields.get("ScanningSequence") {
            Some(Value::String(value)) => Some(value.replace('\\', "_")),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("_"),
            ),
            _ => None,
        }
    }

    pub fn intended_for(&self) -> Option<Vec<String>> {
        match self.fields.get(INTENDED_FOR)? {
            Value::String(value) => Some(vec![value.clone()]),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => Some(Vec::new()),
        }
    }

    pub fn set_intended_for(&mut self, links: &[String]) {
        let value = Value::Array(links.iter().cloned().map(Value::String).collect());
        self.fields.insert(INTENDED_FOR.to_string(), value);
    }
}

pub fn parse_acquisition_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn minutes_of_day(time: NaiveTime) -> f64 {
    f64::from(time.num_seconds_from_midnight()) / 60.0 + f64::from(time.nanosecond()) / 60.0e9
}
