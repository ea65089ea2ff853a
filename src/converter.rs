use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::Compression;
use crate::error::BidsError;
use crate::fs_util;

pub const DCM2NIIX: &str = "dcm2niix";
pub const MIN_DCM2NIIX_VERSION: &str = "v1.0.20181125";
/// Output filename template; parsed back by `entities::ConverterName`.
pub const FILENAME_TEMPLATE: &str = "%n--%d--%q--%s";

static VERSION_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"v\d+\.\d+\.\d+").ok());

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConversionOptions {
    pub compression: Compression,
    pub anonymize: bool,
}

pub trait NiftiConverter {
    fn convert(
        &self,
        dicom_dir: &Utf8Path,
        output_dir: &Utf8Path,
        options: ConversionOptions,
    ) -> Result<(), BidsError>;

    fn version(&self) -> Option<String>;

    fn check_version(&self) -> Result<String, BidsError> {
        require_minimum_version(self.version())
    }
}

#[derive(Debug, Clone)]
pub struct Dcm2niix {
    program: Option<PathBuf>,
}

impl Dcm2niix {
    pub fn new() -> Self {
        Self {
            program: find_in_path(DCM2NIIX),
        }
    }

    fn require(&self) -> Result<&PathBuf, BidsError> {
        self.program
            .as_ref()
            .ok_or_else(|| BidsError::MissingTool(DCM2NIIX.to_string()))
    }
}

impl Default for Dcm2niix {
    fn default() -> Self {
        Self::new()
    }
}

impl NiftiConverter for Dcm2niix {
    fn convert(
        &self,
        dicom_dir: &Utf8Path,
        output_dir: &Utf8Path,
        options: ConversionOptions,
    ) -> Result<(), BidsError> {
        let program = self.require()?;
        fs_util::ensure_dir(output_dir)?;
        let args = conversion_args(dicom_dir, output_dir, options);
        info!(source = %dicom_dir, output = %output_dir, "converting DICOM images");
        debug!(args = ?args, "dcm2niix command line");

        let output = Command::new(program)
            .args(&args)
            .output()
            .map_err(|err| BidsError::Conversion(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", program.display())
        } else {
            stderr
        };
        Err(BidsError::Conversion(message))
    }

    fn version(&self) -> Option<String> {
        let program = self.program.as_ref()?;
        // The version banner is printed even when run without arguments.
        let output = Command::new(program).output().ok()?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        parse_version(&text)
    }

    fn check_version(&self) -> Result<String, BidsError> {
        self.require()?;
        let found = require_minimum_version(self.version())?;
        info!(version = %found, "dcm2niix detected");
        Ok(found)
    }
}

fn require_minimum_version(found: Option<String>) -> Result<String, BidsError> {
    let found = found.unwrap_or_else(|| "unknown".to_string());
    if !version_at_least(&found, MIN_DCM2NIIX_VERSION) {
        return Err(BidsError::ToolVersion {
            tool: DCM2NIIX.to_string(),
            found,
            required: MIN_DCM2NIIX_VERSION.to_string(),
        });
    }
    Ok(found)
}

pub fn conversion_args(dicom_dir: &Utf8Path, output_dir: &Utf8Path, options: ConversionOptions) -> Vec<String> {
    vec![
        "-b".to_string(),
        "y".to_string(),
        "-ba".to_string(),
        if options.anonymize { "y" } else { "n" }.to_string(),
        "-z".to_string(),
        options.compression.flag().to_string(),
        "-f".to_string(),
        FILENAME_TEMPLATE.to_string(),
        "-o".to_string(),
        output_dir.to_string(),
        dicom_dir.to_string(),
    ]
}

pub fn parse_version(text: &str) -> Option<String> {
    VERSION_TOKEN
        .as_ref()?
        .find(text)
        .map(|found| found.as_str().to_string())
}

pub fn version_at_least(found: &str, required: &str) -> bool {
    match (version_parts(found), version_parts(required)) {
        (Some(found), Some(required)) => found >= required,
        _ => false,
    }
}

fn version_parts(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.trim_start_matches('v').split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    Some((major, minor, patch))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
