use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{KeyFlags, Purpose, SequenceTag};
use crate::entities::{self, ConverterName, EntitySet};
use crate::error::BidsError;
use crate::fs_util::{self, WriteAction};
use crate::series::SeriesRecord;
use crate::sidecar::Sidecar;

pub const EVENTS_HEADER: &str = "onset\tduration\ttrial_type\tresponse_time\n";
pub const UNKNOWN_TASK: &str = "unknown";

#[derive(Debug, Clone)]
pub struct SeriesTarget<'a> {
    pub record: &'a SeriesRecord,
    pub purpose: Purpose,
    pub entities: EntitySet,
    pub directory: Utf8PathBuf,
    pub intended_for: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    pub source: Utf8PathBuf,
    pub dest: Utf8PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct OutputPlan {
    pub image: Option<FileCopy>,
    pub sidecar: Option<(Utf8PathBuf, Sidecar)>,
    pub gradients: Vec<FileCopy>,
    pub events: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenFile {
    pub path: String,
    pub action: WriteAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreLayout {
    PhaseDifference,
    SeparatePhases,
    Unmatched,
}

pub fn plan(target: SeriesTarget<'_>, flags: KeyFlags) -> OutputPlan {
    let record = target.record;
    let mut entities = target.entities;
    let mut sidecar = record.sidecar.clone().unwrap_or_default();
    let mut keep_sidecar = true;
    let mut gradients = Vec::new();
    let mut events = None;

    match (&target.purpose, &record.sequence) {
        (Purpose::Func, SequenceTag::Epi) => {
            debug!(description = %record.description, "EPI detected");
            split_by_echo(&mut entities, &sidecar, flags.echo);
            split_by_complex_part(&mut entities, &record.converter, flags.part);
            if entities.suffix() == Some("bold") {
                events = Some(events_path(&entities, &target.directory));
            }
            let task = entities.get("task").unwrap_or(UNKNOWN_TASK).to_string();
            sidecar.insert("TaskName", task);
        }
        (Purpose::Fmap, sequence) => {
            if let Some(links) = &target.intended_for {
                sidecar.set_intended_for(links);
            }
            match sequence {
                SequenceTag::GradientEcho => {
                    keep_sidecar = plan_gre_fieldmap(record, &mut entities, &mut sidecar);
                }
                SequenceTag::Epi => {
                    debug!(description = %record.description, "SE-EPI fieldmap detected");
                    split_by_complex_part(&mut entities, &record.converter, flags.part);
                }
                other => {
                    warn!(
                        subject = %record.subject,
                        description = %record.description,
                        sequence = %other,
                        "unrecognised fieldmap sequence, copying image and sidecar unchanged"
                    );
                }
            }
        }
        (Purpose::Anat, SequenceTag::InversionRecoveryGradientEcho) => {
            debug!(description = %record.description, "IR-prepared GRE detected");
            split_by_echo(&mut entities, &sidecar, flags.echo);
            split_by_complex_part(&mut entities, &record.converter, flags.part);
            split_by_bias_recon(&mut entities, &sidecar, flags.recon);
        }
        (Purpose::Anat, SequenceTag::SpinEcho) => {
            debug!(description = %record.description, "spin echo detected");
            split_by_bias_recon(&mut entities, &sidecar, flags.recon);
        }
        (Purpose::Dwi, _) => {
            if entities.suffix() == Some("dwi") {
                for extension in [".bval", ".bvec"] {
                    let source = entities::with_extension(&record.image_path, extension);
                    if source.as_std_path().is_file() {
                        let dest = entities::build(
                            &entities.clone().with_extension(extension),
                            &target.directory,
                        );
                        gradients.push(FileCopy { source, dest });
                    } else {
                        warn!(subject = %record.subject, path = %source, "diffusion gradient table missing");
                    }
                }
            }
        }
        _ => {}
    }

    let image_dest = entities::build(&entities, &target.directory);
    let sidecar = keep_sidecar.then(|| {
        let json_dest = entities::build(&entities.clone().with_extension(".json"), &target.directory);
        (json_dest, sidecar)
    });

    OutputPlan {
        image: Some(FileCopy {
            source: record.image_path.clone(),
            dest: image_dest,
        }),
        sidecar,
        gradients,
        events,
    }
}

impl OutputPlan {
    pub fn write(&self, overwrite: bool) -> Result<Vec<WrittenFile>, BidsError> {
        let mut written = Vec::new();
        if let Some(copy) = &self.image {
            let action = fs_util::safe_copy(&copy.source, &copy.dest, overwrite)?;
            written.push(WrittenFile {
                path: copy.dest.to_string(),
                action,
            });
        }
        if let Some((path, sidecar)) = &self.sidecar {
            let action = sidecar.write(path, overwrite)?;
            written.push(WrittenFile {
                path: path.to_string(),
                action,
            });
        }
        for copy in &self.gradients {
            let action = fs_util::safe_copy(&copy.source, &copy.dest, overwrite)?;
            written.push(WrittenFile {
                path: copy.dest.to_string(),
                action,
            });
        }
        if let Some(path) = &self.events {
            let action = fs_util::safe_write(path, EVENTS_HEADER, overwrite)?;
            written.push(WrittenFile {
                path: path.to_string(),
                action,
            });
        }
        Ok(written)
    }
}

fn events_path(entities: &EntitySet, directory: &Utf8Path) -> Utf8PathBuf {
    let mut events = entities.clone();
    events.remove("echo");
    events.remove("part");
    events.set_suffix("events");
    events.set_extension(".tsv");
    entities::build(&events, directory)
}

pub fn split_by_echo(entities: &mut EntitySet, sidecar: &Sidecar, enabled: bool) {
    let Some(echo) = sidecar.echo_number() else {
        return;
    };
    debug!(echo, "multiple echoes detected");
    if !enabled {
        return;
    }
    if entities.contains("echo") {
        warn!(
            name = %entities.file_name(),
            "echo key already present in translator stub, leaving it unchanged"
        );
        return;
    }
    entities.set("echo", echo.to_string());
}

pub fn split_by_complex_part(entities: &mut EntitySet, converter: &ConverterName, enabled: bool) {
    if !enabled {
        return;
    }
    let part = if converter.is_phase() { "phase" } else { "mag" };
    debug!(part, "complex part detected");
    entities.set("part", part);
}

pub fn split_by_bias_recon(entities: &mut EntitySet, sidecar: &Sidecar, enabled: bool) {
    if !enabled {
        return;
    }
    let normalized = sidecar.image_type().iter().any(|flag| flag == "NORM");
    entities.set("rec", if normalized { "norm" } else { "bias" });
}

/// Detect the GRE layout from the phase series being one above the magnitude series.
pub fn detect_gre_layout(converter: &ConverterName) -> GreLayout {
    let base = if converter.is_phase() {
        converter.series.checked_sub(1)
    } else {
        Some(converter.series)
    };
    let Some(base) = base else {
        return GreLayout::Unmatched;
    };
    let phase_series = base + 1;
    let exists = |suffix: &str| {
        converter
            .sibling(phase_series, suffix, ".json")
            .as_std_path()
            .is_file()
    };
    let echo1_phase = exists("e1_ph");
    let echo2_phase = exists("e2_ph") || exists("ph");
    match (echo1_phase, echo2_phase) {
        (true, true) => GreLayout::SeparatePhases,
        (false, true) => GreLayout::PhaseDifference,
        _ => GreLayout::Unmatched,
    }
}

fn plan_gre_fieldmap(record: &SeriesRecord, entities: &mut EntitySet, sidecar: &mut Sidecar) -> bool {
    let converter = &record.converter;
    let echo = converter.echo_number().or(record.echo_number).unwrap_or(1);

    match detect_gre_layout(converter) {
        GreLayout::PhaseDifference if converter.is_phase() => {
            info!(description = %record.description, "inter-echo phase difference detected");
            entities.set_suffix("phasediff");
            let mag1_path = converter.sibling(converter.series - 1, "e1", ".json");
            let te1 = Sidecar::read_or_empty(&mag1_path).echo_time();
            let te2 = sidecar.echo_time();
            match (te1, te2) {
                (Some(te1), Some(te2)) => {
                    info!(te1, te2, delta_te = te2 - te1, "GRE fieldmap echo times");
                    sidecar.insert("EchoTime1", te1);
                    sidecar.insert("EchoTime2", te2);
                }
                _ => warn!(
                    subject = %record.subject,
                    description = %record.description,
                    "could not determine GRE fieldmap echo times"
                ),
            }
            true
        }
        GreLayout::PhaseDifference => {
            info!(echo, "magnitude image detected, discarding its sidecar");
            entities.set_suffix(format!("magnitude{echo}"));
            false
        }
        GreLayout::SeparatePhases => {
            warn!(
                subject = %record.subject,
                description = %record.description,
                "GRE fieldmap with separate phase images per echo is not fully supported, check the fmap/ contents"
            );
            if converter.is_phase() {
                entities.set_suffix(format!("phase{echo}"));
                true
            } else {
                entities.set_suffix(format!("magnitude{echo}"));
                false
            }
        }
        GreLayout::Unmatched => {
            warn!(
                subject = %record.subject,
                description = %record.description,
                series = converter.series,
                "GRE fieldmap does not follow the magnitude/phase series numbering, copying unchanged"
            );
            true
        }
    }
}
