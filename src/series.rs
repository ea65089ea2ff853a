use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveTime;
use tracing::{info, warn};

use crate::domain::SequenceTag;
use crate::entities::{self, ConverterName};
use crate::error::BidsError;
use crate::fs_util;
use crate::sidecar::Sidecar;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageFlags {
    pub magnitude: bool,
    pub phase: bool,
    pub normalized: bool,
}

impl ImageFlags {
    pub fn from_image_type(image_type: &[String]) -> Self {
        let has = |flag: &str| image_type.iter().any(|value| value.eq_ignore_ascii_case(flag));
        Self {
            magnitude: has("M") || has("MAGNITUDE"),
            phase: has("P") || has("PHASE"),
            normalized: has("NORM"),
        }
    }

    pub fn label(&self) -> String {
        let mut label = String::new();
        if self.magnitude {
            label.push('M');
        }
        if self.phase {
            label.push('P');
        }
        if self.normalized {
            label.push('N');
        }
        label
    }
}

#[derive(Debug, Clone)]
pub struct SeriesRecord {
    pub subject: String,
    pub session: Option<String>,
    pub description: String,
    pub converter: ConverterName,
    pub sequence: SequenceTag,
    pub acquisition_time: Option<NaiveTime>,
    pub echo_number: Option<u32>,
    pub flags: ImageFlags,
    pub image_path: Utf8PathBuf,
    pub sidecar_path: Utf8PathBuf,
    pub sidecar: Option<Sidecar>,
}

impl SeriesRecord {
    pub fn load(
        image_path: &Utf8Path,
        subject: &str,
        session: Option<&str>,
    ) -> Result<Self, BidsError> {
        let converter = ConverterName::parse(image_path)?;
        let sidecar_path = entities::image_to_sidecar(image_path);
        let sidecar = if sidecar_path.as_std_path().is_file() {
            Some(Sidecar::read_or_empty(&sidecar_path))
        } else {
            None
        };

        let description = sidecar
            .as_ref()
            .and_then(Sidecar::series_description)
            .unwrap_or_else(|| converter.description.clone());
        let sequence = if converter.sequence.is_empty() {
            sidecar
                .as_ref()
                .and_then(Sidecar::scanning_sequence)
                .map(|value| SequenceTag::parse(&value))
                .unwrap_or_else(|| SequenceTag::Other(String::new()))
        } else {
            SequenceTag::parse(&converter.sequence)
        };
        let acquisition_time = sidecar.as_ref().and_then(Sidecar::acquisition_time);
        let echo_number = sidecar
            .as_ref()
            .and_then(Sidecar::echo_number)
            .or_else(|| converter.echo_number());
        let flags = sidecar
            .as_ref()
            .map(|meta| ImageFlags::from_image_type(&meta.image_type()))
            .unwrap_or_default();

        Ok(Self {
            subject: subject.to_string(),
            session: session.map(str::to_string),
            description,
            converter,
            sequence,
            acquisition_time,
            echo_number,
            flags,
            image_path: image_path.to_path_buf(),
            sidecar_path,
            sidecar,
        })
    }

    pub fn distinguishing_suffix(&self) -> String {
        let echo = self
            .echo_number
            .map(|echo| format!("e{echo}"))
            .unwrap_or_default();
        format!("{}|{}|{}", self.converter.suffix, echo, self.flags.label())
    }
}

fn is_nifti(name: &str) -> bool {
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// Discovery order (sorted filenames) is kept when any acquisition time is missing
/// or all times are identical.
pub fn scan_conversion_dir(
    conversion_dir: &Utf8Path,
    subject: &str,
    session: Option<&str>,
) -> Result<Vec<SeriesRecord>, BidsError> {
    let images = fs_util::list_files(conversion_dir, is_nifti)?;
    let mut records = Vec::with_capacity(images.len());
    for image in images {
        match SeriesRecord::load(&image, subject, session) {
            Ok(record) => records.push(record),
            Err(err) => warn!(subject, path = %image, "skipping unrecognised converter output: {err}"),
        }
    }

    let times = records
        .iter()
        .map(|record| record.acquisition_time)
        .collect::<Option<Vec<_>>>();
    match times {
        Some(times) if times.windows(2).any(|pair| pair[0] != pair[1]) => {
            info!(subject, "sorting series by acquisition time");
            records.sort_by_key(|record| record.acquisition_time);
        }
        Some(_) => {}
        None => {
            warn!(subject, "acquisition times missing from metadata, series cannot be ordered accurately");
        }
    }
    Ok(records)
}
