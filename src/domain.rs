use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::BidsError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Purpose {
    Anat,
    Func,
    Fmap,
    Dwi,
    Other(String),
}

impl Purpose {
    pub fn as_str(&self) -> &str {
        match self {
            Purpose::Anat => "anat",
            Purpose::Func => "func",
            Purpose::Fmap => "fmap",
            Purpose::Dwi => "dwi",
            Purpose::Other(name) => name,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Purpose {
    fn from(value: &str) -> Self {
        match value.trim() {
            "anat" => Purpose::Anat,
            "func" => Purpose::Func,
            "fmap" => Purpose::Fmap,
            "dwi" => Purpose::Dwi,
            other => Purpose::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SequenceTag {
    Epi,
    GradientEcho,
    SpinEcho,
    InversionRecoveryGradientEcho,
    Other(String),
}

impl SequenceTag {
    pub fn parse(value: &str) -> Self {
        let mut parts = value
            .split(|ch: char| ch == '_' || ch == '\\' || ch == ' ')
            .filter(|part| !part.is_empty())
            .map(|part| part.to_ascii_uppercase())
            .collect::<Vec<_>>();
        parts.sort();
        parts.dedup();
        match parts.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["EP"] => SequenceTag::Epi,
            ["GR"] => SequenceTag::GradientEcho,
            ["SE"] => SequenceTag::SpinEcho,
            ["GR", "IR"] => SequenceTag::InversionRecoveryGradientEcho,
            _ => SequenceTag::Other(value.to_string()),
        }
    }
}

impl fmt::Display for SequenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceTag::Epi => write!(f, "EP"),
            SequenceTag::GradientEcho => write!(f, "GR"),
            SequenceTag::SpinEcho => write!(f, "SE"),
            SequenceTag::InversionRecoveryGradientEcho => write!(f, "GR_IR"),
            SequenceTag::Other(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFlags {
    #[serde(default)]
    pub echo: bool,
    #[serde(default)]
    pub part: bool,
    #[serde(default)]
    pub recon: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Compression {
    #[serde(rename = "y")]
    #[value(name = "y")]
    Gzip,
    #[default]
    #[serde(rename = "o")]
    #[value(name = "o")]
    Optimal,
    #[serde(rename = "i")]
    #[value(name = "i")]
    Internal,
    #[serde(rename = "n")]
    #[value(name = "n")]
    Uncompressed,
    #[serde(rename = "3")]
    #[value(name = "3")]
    Single3d,
}

impl Compression {
    pub fn flag(self) -> &'static str {
        match self {
            Compression::Gzip => "y",
            Compression::Optimal => "o",
            Compression::Internal => "i",
            Compression::Uncompressed => "n",
            Compression::Single3d => "3",
        }
    }

    pub fn nifti_extension(self) -> &'static str {
        match self {
            Compression::Uncompressed => ".nii",
            _ => ".nii.gz",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Label {
    type Err = BidsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && !trimmed.contains(['-', '_']);
        if !is_valid {
            return Err(BidsError::InvalidLabel(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}
