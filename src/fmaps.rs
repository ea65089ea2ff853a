use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities;
use crate::error::BidsError;
use crate::fs_util;
use crate::sidecar::{self, Sidecar};

pub const GRE_PAIR_WINDOW_MINUTES: f64 = 1.0;

pub const DATASET_DESCRIPTION: &str = "dataset_description.json";

#[derive(Debug, Clone, Default, Serialize)]
pub struct BindReport {
    pub bound: BTreeMap<String, Vec<String>>,
    pub skipped: Vec<String>,
}

/// GRE fieldmaps are only used when a session has no SE-EPI fieldmaps.
pub fn bind(
    subject_dir: &Utf8Path,
    use_sessions: bool,
    nifti_extension: &str,
) -> Result<BindReport, BidsError> {
    let session_dirs = if use_sessions {
        fs_util::list_dirs(subject_dir)?
            .into_iter()
            .filter(|dir| dir.file_name().is_some_and(|name| name.starts_with("ses-")))
            .collect()
    } else {
        vec![subject_dir.to_path_buf()]
    };

    let mut report = BindReport::default();
    for session_dir in session_dirs {
        let bold_jsons = fs_util::list_files(&session_dir.join("func"), |name| {
            name.contains("task-") && name.ends_with("_bold.json")
        })?;
        let bolds = read_timed(&bold_jsons);

        let fmap_dir = session_dir.join("fmap");
        let epi_jsons = fs_util::list_files(&fmap_dir, |name| {
            name.contains("_dir-") && name.ends_with("_epi.json")
        })?;
        let gre_jsons = fs_util::list_files(&fmap_dir, |name| {
            name.ends_with(".json") && (name.contains("_phase") || name.contains("_magnitude"))
        })?;

        let (layout, fmap_jsons) = if !epi_jsons.is_empty() {
            (FmapLayout::SpinEcho, epi_jsons)
        } else if !gre_jsons.is_empty() {
            (FmapLayout::GradientEcho, gre_jsons)
        } else {
            info!(path = %fmap_dir, "no fieldmaps detected, skipping");
            report.skipped.push(session_dir.to_string());
            continue;
        };
        let fmaps = read_timed(&fmap_jsons);
        let bindings = match layout {
            FmapLayout::SpinEcho => bind_epi(&fmaps, &bolds),
            FmapLayout::GradientEcho => bind_gre(&fmaps, &bolds),
        };

        for (fmap, targets) in bindings {
            let links = targets
                .iter()
                .map(|bold| intended_link(&bold.path, subject_dir, nifti_extension))
                .collect::<Result<Vec<_>, _>>()?;
            let mut meta = Sidecar::read_or_empty(&fmap.path);
            meta.set_intended_for(&links);
            meta.write(&fmap.path, true)?;
            report.bound.insert(fmap.path.to_string(), links);
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, Copy)]
enum FmapLayout {
    SpinEcho,
    GradientEcho,
}

#[derive(Debug, Clone)]
struct TimedSidecar {
    path: Utf8PathBuf,
    minutes: f64,
}

impl TimedSidecar {
    fn read(path: &Utf8Path) -> Result<Self, BidsError> {
        let meta = Sidecar::read(path)?;
        let minutes = match meta.acquisition_time() {
            Some(time) => sidecar::minutes_of_day(time),
            None => {
                warn!(path = %path, "AcquisitionTime not found, assuming 00:00:00");
                0.0
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            minutes,
        })
    }
}

fn read_timed(paths: &[Utf8PathBuf]) -> Vec<TimedSidecar> {
    paths
        .iter()
        .filter_map(|path| match TimedSidecar::read(path) {
            Ok(timed) => Some(timed),
            Err(err) => {
                warn!(path = %path, "skipping unreadable sidecar: {err}");
                None
            }
        })
        .collect()
}

/// Index of the entry with the smallest time difference; ties keep the first.
fn nearest(candidates: &[&TimedSidecar], minutes: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let dt = (candidate.minutes - minutes).abs();
        if best.is_none_or(|(_, best_dt)| dt < best_dt) {
            best = Some((index, dt));
        }
    }
    best.map(|(index, _)| index)
}

fn bind_epi<'a>(
    fmaps: &'a [TimedSidecar],
    bolds: &'a [TimedSidecar],
) -> Vec<(&'a TimedSidecar, Vec<&'a TimedSidecar>)> {
    let mut groups = BTreeMap::<String, Vec<&TimedSidecar>>::new();
    for fmap in fmaps {
        let (set, _) = entities::parse(&fmap.path);
        let direction = set.get("dir").unwrap_or_default().to_string();
        groups.entry(direction).or_default().push(fmap);
    }

    let mut bindings = Vec::new();
    for (direction, group) in groups {
        info!(direction = %direction, count = group.len(), "binding SE-EPI fieldmaps");
        let mut targets = vec![Vec::new(); group.len()];
        for bold in bolds {
            if let Some(index) = nearest(&group, bold.minutes) {
                targets[index].push(bold);
            }
        }
        bindings.extend(group.into_iter().zip(targets));
    }
    bindings
}

fn bind_gre<'a>(
    fmaps: &'a [TimedSidecar],
    bolds: &'a [TimedSidecar],
) -> Vec<(&'a TimedSidecar, Vec<&'a TimedSidecar>)> {
    info!(count = fmaps.len(), "binding GRE fieldmaps");
    let mut targets = vec![Vec::new(); fmaps.len()];
    for bold in bolds {
        let dts = fmaps
            .iter()
            .map(|fmap| (fmap.minutes - bold.minutes).abs())
            .collect::<Vec<_>>();
        let Some(dt_min) = dts.iter().copied().reduce(f64::min) else {
            continue;
        };
        for (index, dt) in dts.iter().enumerate() {
            if (dt - dt_min).abs() < GRE_PAIR_WINDOW_MINUTES {
                targets[index].push(bold);
            }
        }
    }
    fmaps.iter().zip(targets).collect()
}

pub fn intended_link(
    json_path: &Utf8Path,
    subject_dir: &Utf8Path,
    nifti_extension: &str,
) -> Result<String, BidsError> {
    let image = entities::with_extension(json_path, nifti_extension);
    let relative = image.strip_prefix(subject_dir).map_err(|_| {
        BidsError::Filesystem(format!("{image} is not inside {subject_dir}"))
    })?;
    Ok(relative.as_str().replace('\\', "/"))
}

pub fn prune_intended_fors(subject_dir: &Utf8Path, fmap_only: bool) -> Result<usize, BidsError> {
    if !subject_dir.as_std_path().is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for path in fs_util::walk_files(subject_dir)? {
        let Some(name) = path.file_name() else {
            continue;
        };
        if !name.ends_with(".json") || name == DATASET_DESCRIPTION {
            continue;
        }
        let in_fmap = path
            .parent()
            .and_then(Utf8Path::file_name)
            .is_some_and(|dir| dir == "fmap");
        if fmap_only && !in_fmap {
            continue;
        }

        let mut meta = match Sidecar::read(&path) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %path, "skipping unreadable sidecar: {err}");
                continue;
            }
        };
        let Some(links) = meta.intended_for() else {
            continue;
        };
        let kept = links
            .iter()
            .filter(|link| subject_dir.join(link.as_str()).as_std_path().is_file())
            .cloned()
            .collect::<Vec<_>>();
        if kept.len() != links.len() {
            info!(path = %path, removed = links.len() - kept.len(), "pruning dangling IntendedFor links");
        }
        removed += links.len() - kept.len();
        meta.set_intended_for(&kept);
        meta.write(&path, true)?;
    }
    Ok(removed)
}
