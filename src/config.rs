use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{Compression, KeyFlags, Label};
use crate::error::BidsError;

pub const CONFIG_FILE: &str = "kira-bids.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub no_sessions: Option<bool>,
    #[serde(default)]
    pub overwrite: Option<bool>,
    #[serde(default)]
    pub compression: Option<Compression>,
    #[serde(default)]
    pub key_flags: Option<KeyFlags>,
    #[serde(default)]
    pub bind_fmaps: Option<bool>,
    #[serde(default)]
    pub auto: Option<bool>,
    #[serde(default)]
    pub clean_conv_dir: Option<bool>,
    #[serde(default)]
    pub skip_pruning: Option<bool>,
    #[serde(default)]
    pub anonymize: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub subjects: Vec<String>,
    pub no_sessions: bool,
    pub overwrite: bool,
    pub compression: Option<Compression>,
    pub echo: bool,
    pub part: bool,
    pub recon: bool,
    pub bind_fmaps: bool,
    pub auto: bool,
    pub clean_conv_dir: bool,
    pub skip_pruning: bool,
    pub no_anon: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub subjects: Vec<Label>,
    pub use_sessions: bool,
    pub overwrite: bool,
    pub compression: Compression,
    pub key_flags: KeyFlags,
    pub bind_fmaps: bool,
    pub auto: bool,
    pub clean_conv_dir: bool,
    pub skip_pruning: bool,
    pub anonymize: bool,
}

impl ResolvedConfig {
    pub fn nifti_extension(&self) -> &'static str {
        self.compression.nifti_extension()
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            subjects: Vec::new(),
            use_sessions: true,
            overwrite: false,
            compression: Compression::default(),
            key_flags: KeyFlags::default(),
            bind_fmaps: false,
            auto: false,
            clean_conv_dir: false,
            skip_pruning: false,
            anonymize: true,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; the implicit one falls back to defaults.
    pub fn resolve(path: Option<&Utf8Path>, dataset_dir: &Utf8Path) -> Result<Config, BidsError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => dataset_dir.join(CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| BidsError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| BidsError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config, overrides: ConfigOverrides) -> Result<ResolvedConfig, BidsError> {
        let defaults = ResolvedConfig::default();
        let file_flags = config.key_flags.unwrap_or_default();

        let subjects = if overrides.subjects.is_empty() {
            config.subjects
        } else {
            overrides.subjects
        };
        let subjects = subjects
            .iter()
            .map(|subject| subject.parse::<Label>())
            .collect::<Result<Vec<_>, BidsError>>()?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            subjects,
            use_sessions: !(overrides.no_sessions || config.no_sessions.unwrap_or(false)),
            overwrite: overrides.overwrite || config.overwrite.unwrap_or(defaults.overwrite),
            compression: overrides
                .compression
                .or(config.compression)
                .unwrap_or(defaults.compression),
            key_flags: KeyFlags {
                echo: overrides.echo || file_flags.echo,
                part: overrides.part || file_flags.part,
                recon: overrides.recon || file_flags.recon,
            },
            bind_fmaps: overrides.bind_fmaps || config.bind_fmaps.unwrap_or(defaults.bind_fmaps),
            auto: overrides.auto || config.auto.unwrap_or(defaults.auto),
            clean_conv_dir: overrides.clean_conv_dir
                || config.clean_conv_dir.unwrap_or(defaults.clean_conv_dir),
            skip_pruning: overrides.skip_pruning
                || config.skip_pruning.unwrap_or(defaults.skip_pruning),
            anonymize: !overrides.no_anon && config.anonymize.unwrap_or(defaults.anonymize),
        })
    }
}
