use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{KeyFlags, Purpose};
use crate::entities::EntitySet;
use crate::error::BidsError;
use crate::purpose::{self, SeriesTarget, WrittenFile};
use crate::runs;
use crate::series::SeriesRecord;
use crate::translator::{self, TranslationEntry, TranslationTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    Discover,
    Populate,
}

impl Pass {
    pub fn select(table: &TranslationTable) -> Self {
        if table.is_empty() {
            Pass::Discover
        } else {
            Pass::Populate
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub subject: String,
    pub session: Option<String>,
    pub output_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct PopulateOptions<'a> {
    pub flags: KeyFlags,
    pub nifti_extension: &'a str,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub subject: String,
    pub session: Option<String>,
    pub organized: Vec<String>,
    pub excluded: Vec<String>,
    pub skipped: Vec<String>,
    pub files: Vec<WrittenFile>,
}

pub fn discover(records: &[SeriesRecord], table: &mut TranslationTable, auto: bool) -> Vec<String> {
    let mut added = Vec::new();
    for record in records {
        if table.contains(&record.description) {
            continue;
        }
        info!(description = %record.description, "adding protocol to translator");
        let entry = if auto {
            translator::auto_translate(&record.description)
        } else {
            TranslationEntry::placeholder()
        };
        table.insert(&record.description, entry);
        added.push(record.description.clone());
    }
    added
}

pub fn populate(
    context: &SessionContext,
    records: &[SeriesRecord],
    table: &TranslationTable,
    options: PopulateOptions<'_>,
) -> Result<SessionReport, BidsError> {
    let run_index = runs::resolve(records, table)?;

    let mut session_table = table.clone();
    for (record, run) in records.iter().zip(run_index.iter()) {
        session_table.qualify_intended_runs(&record.description, run);
    }

    let mut report = SessionReport {
        subject: context.subject.clone(),
        session: context.session.clone(),
        ..SessionReport::default()
    };

    for (position, record) in records.iter().enumerate() {
        if record.sidecar.is_none() {
            warn!(
                subject = %context.subject,
                path = %record.sidecar_path,
                "JSON sidecar not found, skipping series"
            );
            report.skipped.push(record.description.clone());
            continue;
        }

        let entry = session_table.lookup(&record.description)?.clone();
        if entry.is_excluded() {
            info!(subject = %context.subject, description = %record.description, "excluding protocol");
            report.excluded.push(record.description.clone());
            continue;
        }
        info!(subject = %context.subject, description = %record.description, "organizing");

        let purpose = entry.purpose();
        let mut entities = EntitySet::from_stub(&entry.stub);
        run_index.get(position).apply(&mut entities);
        entities.set("sub", context.subject.as_str());
        if let Some(session) = &context.session {
            entities.set("ses", session.as_str());
        }
        entities.set_extension(options.nifti_extension);

        let intended_for = (!entry.intended_for.is_unassigned()).then(|| {
            entry
                .intended_for
                .targets()
                .iter()
                .map(|target| {
                    build_intended_for(
                        &context.subject,
                        context.session.as_deref(),
                        target,
                        options.nifti_extension,
                    )
                })
                .collect::<Vec<_>>()
        });

        let target = SeriesTarget {
            record,
            directory: context.output_dir.join(purpose.as_str()),
            purpose,
            entities,
            intended_for,
        };
        let plan = purpose::plan(target, options.flags);
        report.files.extend(plan.write(options.overwrite)?);
        report.organized.push(record.description.clone());
    }

    Ok(report)
}

pub fn build_intended_for(
    subject: &str,
    session: Option<&str>,
    target: &str,
    nifti_extension: &str,
) -> String {
    if target.ends_with(nifti_extension) {
        return target.to_string();
    }
    let (dir, name) = translator::split_target(target);
    let dir = if dir.is_empty() { Purpose::Func.as_str() } else { dir };
    let mut entities = EntitySet::from_stub(name);
    entities.set("sub", subject);
    if let Some(session) = session {
        entities.set("ses", session);
    }
    entities.set_extension(nifti_extension);

    let mut path = Utf8PathBuf::new();
    if let Some(session) = session {
        path.push(format!("ses-{session}"));
    }
    path.push(dir);
    path.push(entities.file_name());
    path.into_string()
}

pub fn session_output_dir(dataset_dir: &Utf8Path, subject: &str, session: Option<&str>) -> Utf8PathBuf {
    let subject_dir = dataset_dir.join(format!("sub-{subject}"));
    match session {
        Some(session) => subject_dir.join(format!("ses-{session}")),
        None => subject_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_selection_is_pure() {
        let mut table = TranslationTable::new();
        assert_eq!(Pass::select(&table), Pass::Discover);
        table.insert("BOLD_REST", TranslationEntry::placeholder());
        assert_eq!(Pass::select(&table), Pass::Populate);
    }

    #[test]
    fn intended_for_targets_become_paths() {
        assert_eq!(
            build_intended_for("01", Some("1"), "func/task-rest_run-1_bold", ".nii.gz"),
            "ses-1/func/sub-01_ses-1_task-rest_run-1_bold.nii.gz"
        );
        assert_eq!(
            build_intended_for("01", None, "task-rest_bold", ".nii"),
            "func/sub-01_task-rest_bold.nii"
        );
        assert_eq!(
            build_intended_for("01", None, "func/sub-01_task-rest_bold.nii.gz", ".nii.gz"),
            "func/sub-01_task-rest_bold.nii.gz"
        );
    }
}
