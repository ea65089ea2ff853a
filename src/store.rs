use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;
use tracing::info;

use crate::error::BidsError;
use crate::fs_util::{self, WriteAction};
use crate::sidecar::Sidecar;

pub const TRANSLATOR_FILE: &str = "Protocol_Translator.json";
pub const PARTICIPANTS_HEADER: &str = "participant_id\tage\tsex\tgroup\n";
pub const DEFAULT_GROUP: &str = "control";
pub const UNKNOWN_VALUE: &str = "N/A";

#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: Utf8PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn sourcedata_dir(&self) -> Utf8PathBuf {
        self.root.join("sourcedata")
    }

    pub fn derivatives_dir(&self) -> Utf8PathBuf {
        self.root.join("derivatives")
    }

    pub fn code_dir(&self) -> Utf8PathBuf {
        self.root.join("code")
    }

    pub fn work_dir(&self) -> Utf8PathBuf {
        self.root.join("work")
    }

    pub fn translator_path(&self) -> Utf8PathBuf {
        self.code_dir().join(TRANSLATOR_FILE)
    }

    pub fn participants_path(&self) -> Utf8PathBuf {
        self.root.join("participants.tsv")
    }

    pub fn subject_dir(&self, subject: &str) -> Utf8PathBuf {
        self.root.join(format!("sub-{subject}"))
    }

    pub fn dicom_dir(&self, subject: &str, session: Option<&str>) -> Utf8PathBuf {
        let dir = self.sourcedata_dir().join(subject);
        match session {
            Some(session) => dir.join(session),
            None => dir,
        }
    }

    pub fn conversion_dir(&self, subject: &str, session: Option<&str>) -> Utf8PathBuf {
        let dir = self.work_dir().join(format!("sub-{subject}"));
        match session {
            Some(session) => dir.join(format!("ses-{session}")),
            None => dir,
        }
    }

    pub fn source_subjects(&self) -> Result<Vec<String>, BidsError> {
        let sourcedata = self.sourcedata_dir();
        if !sourcedata.as_std_path().is_dir() {
            return Err(BidsError::MissingSourcedata(self.root.clone()));
        }
        dir_names(&sourcedata)
    }

    pub fn source_sessions(&self, subject: &str) -> Result<Vec<String>, BidsError> {
        dir_names(&self.dicom_dir(subject, None))
    }

    pub fn ensure_layout(&self, overwrite: bool) -> Result<Vec<(Utf8PathBuf, WriteAction)>, BidsError> {
        info!(path = %self.root, "initializing BIDS dataset directory tree");
        fs_util::ensure_dir(&self.derivatives_dir())?;
        fs_util::ensure_dir(&self.code_dir())?;
        fs_util::ensure_dir(&self.work_dir())?;

        let mut written = Vec::new();
        let texts = [
            ("README", "Useful information about this dataset\n"),
            ("CHANGES", "1.0.0 YYYY-MM-DD\n - Initial release\n"),
            (".bidsignore", "work/\n"),
        ];
        for (name, content) in texts {
            let path = self.root.join(name);
            let action = fs_util::safe_write(&path, content, overwrite)?;
            written.push((path, action));
        }

        let dataset_description = self.root.join("dataset_description.json");
        let action = template(dataset_description_template()).write(&dataset_description, overwrite)?;
        written.push((dataset_description, action));

        let participants_json = self.root.join("participants.json");
        let action = template(participants_template()).write(&participants_json, overwrite)?;
        written.push((participants_json, action));

        Ok(written)
    }

    pub fn add_participant_record(
        &self,
        subject: &str,
        age: Option<&str>,
        sex: Option<&str>,
    ) -> Result<bool, BidsError> {
        let path = self.participants_path();
        let participant_id = format!("sub-{subject}");
        let mut content = if path.as_std_path().is_file() {
            fs::read_to_string(path.as_std_path())
                .map_err(|err| BidsError::Filesystem(format!("read {path}: {err}")))?
        } else {
            PARTICIPANTS_HEADER.to_string()
        };

        let known = content
            .lines()
            .skip(1)
            .any(|line| line.split('\t').next() == Some(participant_id.as_str()));
        if known {
            return Ok(false);
        }

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        let age = format_age(age);
        let row = [
            participant_id.as_str(),
            age.as_str(),
            sex.filter(|sex| !sex.is_empty()).unwrap_or(UNKNOWN_VALUE),
            DEFAULT_GROUP,
        ]
        .join("\t");
        content.push_str(&row);
        content.push('\n');
        info!(subject, "adding participant record");
        fs_util::write_bytes_atomic(&path, content.as_bytes())?;
        Ok(true)
    }

    pub fn clean_conversion_dir(&self, subject: &str, session: Option<&str>) -> Result<bool, BidsError> {
        let dir = self.conversion_dir(subject, session);
        if !dir.as_std_path().is_dir() {
            return Ok(false);
        }
        info!(path = %dir, "removing conversion directory");
        fs::remove_dir_all(dir.as_std_path())
            .map_err(|err| BidsError::Filesystem(format!("remove {dir}: {err}")))?;
        Ok(true)
    }
}

/// DICOM age strings such as `034Y` become `34`.
pub fn format_age(age: Option<&str>) -> String {
    match age.map(|age| age.trim_start_matches('0').trim_end_matches('Y')) {
        Some(age) if !age.is_empty() => age.to_string(),
        _ => UNKNOWN_VALUE.to_string(),
    }
}

fn dir_names(root: &Utf8Path) -> Result<Vec<String>, BidsError> {
    Ok(fs_util::list_dirs(root)?
        .into_iter()
        .filter_map(|dir| dir.file_name().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect())
}

fn template(value: serde_json::Value) -> Sidecar {
    match value {
        serde_json::Value::Object(fields) => Sidecar::new(fields),
        _ => Sidecar::default(),
    }
}

fn dataset_description_template() -> serde_json::Value {
    json!({
        "Name": "Descriptive name for this dataset",
        "BIDSVersion": "1.2",
        "License": "This data is made available under the Creative Commons BY-SA 4.0 International License.",
        "Authors": ["First Author", "Second Author"],
        "Acknowledgments": "Thanks to everyone for all your help",
        "HowToAcknowledge": "Please cite: Author AB, Seminal Paper Title, High Impact Journal, 2019",
        "Funding": ["First Grant", "Second Grant"],
        "ReferencesAndLinks": ["A Reference", "Another Reference", "A Link"],
        "DatasetDOI": "10.0.1.2/abcd.10"
    })
}

fn participants_template() -> serde_json::Value {
    json!({
        "age": {
            "Description": "Age of participant",
            "Units": "years"
        },
        "sex": {
            "Description": "Sex of participant",
            "Levels": {
                "M": "male",
                "F": "female",
                "T": "transgender"
            }
        },
        "group": {
            "Description": "participant group assignment"
        }
    })
}
