use std::fs;

use camino::Utf8Path;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::Purpose;
use crate::entities::EntitySet;
use crate::error::BidsError;
use crate::fs_util;
use crate::runs::RunNumber;

pub const EXCLUDE_MARKER: &str = "EXCLUDE";
pub const UNASSIGNED: &str = "UNASSIGNED";
pub const PLACEHOLDER_PURPOSE: &str = "EXCLUDE_BIDS_Directory";
pub const PLACEHOLDER_STUB: &str = "EXCLUDE_BIDS_Name";

const FUNC_SUFFIXES: [&str; 4] = ["bold", "sbref", "cbv", "phase"];
const ANAT_SUFFIXES: [&str; 14] = [
    "T1w", "T2w", "PDw", "T2starw", "FLAIR", "defacemask", "MEGRE", "MESE", "VFA", "IRT1",
    "MP2RAGE", "MPM", "MTS", "MTR",
];
const FMAP_SUFFIXES: [&str; 8] = [
    "epi",
    "phasediff",
    "magnitude",
    "magnitude1",
    "magnitude2",
    "phase1",
    "phase2",
    "fieldmap",
];
const DWI_SUFFIXES: [&str; 1] = ["dwi"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawIntendedFor", into = "RawIntendedFor")]
pub enum IntendedFor {
    Unassigned,
    Single(String),
    Many(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawIntendedFor {
    One(String),
    List(Vec<String>),
}

impl From<RawIntendedFor> for IntendedFor {
    fn from(value: RawIntendedFor) -> Self {
        match value {
            RawIntendedFor::One(value) if value == UNASSIGNED => IntendedFor::Unassigned,
            RawIntendedFor::One(value) => IntendedFor::Single(value),
            RawIntendedFor::List(values) => IntendedFor::Many(values),
        }
    }
}

impl From<IntendedFor> for RawIntendedFor {
    fn from(value: IntendedFor) -> Self {
        match value {
            IntendedFor::Unassigned => RawIntendedFor::One(UNASSIGNED.to_string()),
            IntendedFor::Single(value) => RawIntendedFor::One(value),
            IntendedFor::Many(values) => RawIntendedFor::List(values),
        }
    }
}

impl IntendedFor {
    pub fn is_unassigned(&self) -> bool {
        match self {
            IntendedFor::Unassigned => true,
            IntendedFor::Single(value) => value == UNASSIGNED,
            IntendedFor::Many(values) => values.iter().any(|value| value == UNASSIGNED),
        }
    }

    pub fn targets(&self) -> Vec<String> {
        match self {
            IntendedFor::Unassigned => Vec::new(),
            IntendedFor::Single(value) => vec![value.clone()],
            IntendedFor::Many(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(String, String, IntendedFor)",
    into = "(String, String, IntendedFor)"
)]
pub struct TranslationEntry {
    pub purpose: String,
    pub stub: String,
    pub intended_for: IntendedFor,
}

impl From<(String, String, IntendedFor)> for TranslationEntry {
    fn from((purpose, stub, intended_for): (String, String, IntendedFor)) -> Self {
        Self {
            purpose,
            stub,
            intended_for,
        }
    }
}

impl From<TranslationEntry> for (String, String, IntendedFor) {
    fn from(entry: TranslationEntry) -> Self {
        (entry.purpose, entry.stub, entry.intended_for)
    }
}

impl TranslationEntry {
    pub fn new(purpose: &str, stub: &str, intended_for: IntendedFor) -> Self {
        Self {
            purpose: purpose.to_string(),
            stub: stub.to_string(),
            intended_for,
        }
    }

    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_PURPOSE, PLACEHOLDER_STUB, IntendedFor::Unassigned)
    }

    pub fn is_excluded(&self) -> bool {
        self.purpose.starts_with(EXCLUDE_MARKER)
    }

    pub fn purpose(&self) -> Purpose {
        Purpose::from(self.purpose.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveOutcome {
    Written,
    Preserved,
}

/// Entries keep the order in which series were discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable {
    entries: Vec<(String, TranslationEntry)>,
}

impl Serialize for TranslationTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (description, entry) in &self.entries {
            map.serialize_entry(description, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TranslationTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut table = Self::default();
        for (description, value) in raw {
            let entry = TranslationEntry::deserialize(value).map_err(de::Error::custom)?;
            table.insert(&description, entry);
        }
        Ok(table)
    }
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Utf8Path) -> Result<Self, BidsError> {
        if !path.as_std_path().exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| BidsError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| BidsError::JsonParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn save(&self, path: &Utf8Path) -> Result<SaveOutcome, BidsError> {
        if path.as_std_path().exists() {
            warn!(path = %path, "protocol translator already exists, skipping creation of a new one");
            return Ok(SaveOutcome::Preserved);
        }
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| BidsError::Filesystem(err.to_string()))?;
        fs_util::write_bytes_atomic(path, &content)?;
        info!(
            path = %path,
            "new protocol translator created; replace EXCLUDE values with BIDS purposes and stubs, then rerun"
        );
        Ok(SaveOutcome::Written)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, description: &str) -> bool {
        self.get(description).is_some()
    }

    pub fn get(&self, description: &str) -> Option<&TranslationEntry> {
        self.entries
            .iter()
            .find(|(key, _)| key.as_str() == description)
            .map(|(_, entry)| entry)
    }

    pub fn lookup(&self, description: &str) -> Result<&TranslationEntry, BidsError> {
        self.get(description)
            .ok_or_else(|| BidsError::MissingTranslation {
                description: description.to_string(),
            })
    }

    pub fn insert(&mut self, description: &str, entry: TranslationEntry) {
        match self.entries.iter().position(|(key, _)| key.as_str() == description) {
            Some(index) => self.entries[index].1 = entry,
            None => self.entries.push((description.to_string(), entry)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TranslationEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// An unqualified target is replaced; a target already qualified for the same
    /// stub gains a sibling for this run. Entries are rebuilt, never edited in place.
    pub fn qualify_intended_runs(&mut self, description: &str, run: RunNumber) {
        let RunNumber::Numbered(run) = run else {
            return;
        };
        let Some(source) = self.get(description) else {
            return;
        };
        let source_stub = EntitySet::from_stub(&source.stub);
        if source_stub.contains("run") {
            return;
        }
        let qualified_name = source_stub.clone().with("run", run.to_string()).stem();
        let plain_name = source_stub.stem();

        let mut updates = Vec::new();
        for (key, entry) in &self.entries {
            if entry.purpose() != Purpose::Fmap || entry.intended_for.is_unassigned() {
                continue;
            }
            let mut targets = entry.intended_for.targets();
            let Some(index) = targets.iter().position(|target| {
                let (_, name) = split_target(target);
                name == plain_name || same_stub_other_run(name, &plain_name)
            }) else {
                continue;
            };
            if targets.iter().any(|target| split_target(target).1 == qualified_name) {
                continue;
            }
            let (dir, name) = split_target(&targets[index]);
            let qualified = join_target(dir, &qualified_name);
            if name == plain_name {
                targets[index] = qualified;
            } else {
                targets.push(qualified);
            }
            updates.push((key.clone(), targets));
        }

        for (key, targets) in updates {
            if let Some(entry) = self.get(&key) {
                let rebuilt = TranslationEntry {
                    intended_for: IntendedFor::Many(targets),
                    ..entry.clone()
                };
                self.insert(&key, rebuilt);
            }
        }
    }
}

pub fn split_target(target: &str) -> (&str, &str) {
    match target.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", target),
    }
}

fn join_target(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn same_stub_other_run(name: &str, plain_name: &str) -> bool {
    let mut set = EntitySet::from_stub(name);
    set.remove("run").is_some() && set.stem() == plain_name
}

pub fn auto_translate(description: &str) -> TranslationEntry {
    let normalized = description.trim().replace(' ', "_");
    let (head, rest) = match normalized.split_once('_') {
        Some((head, rest)) => (head.to_string(), rest.to_string()),
        None => (normalized.clone(), String::new()),
    };

    // ReproIn: <purpose>-<suffix>[_key-value...]
    if let Some((prefix, seqtype)) = head.split_once('-') {
        if let Some(purpose) = purpose_prefix(prefix) {
            let mut stub = EntitySet::from_stub(&rest);
            strip_subject_keys(&mut stub);
            let suffix = canonical_suffix(seqtype)
                .map(|(_, suffix)| suffix.to_string())
                .unwrap_or_else(|| seqtype.to_string());
            stub.set_suffix(suffix);
            return TranslationEntry::new(purpose, &stub.stem(), IntendedFor::Unassigned);
        }
    }

    let mut stub = EntitySet::from_stub(&normalized);
    strip_subject_keys(&mut stub);
    if let Some((purpose, suffix)) = stub.suffix().and_then(canonical_suffix) {
        stub.set_suffix(suffix);
        return TranslationEntry::new(purpose, &stub.stem(), IntendedFor::Unassigned);
    }

    TranslationEntry::placeholder()
}

fn purpose_prefix(prefix: &str) -> Option<&'static str> {
    match prefix.to_ascii_lowercase().as_str() {
        "anat" => Some("anat"),
        "func" => Some("func"),
        "fmap" => Some("fmap"),
        "dwi" => Some("dwi"),
        _ => None,
    }
}

fn canonical_suffix(value: &str) -> Option<(&'static str, &'static str)> {
    let vocabularies: [(&'static str, &[&'static str]); 4] = [
        ("func", &FUNC_SUFFIXES),
        ("anat", &ANAT_SUFFIXES),
        ("fmap", &FMAP_SUFFIXES),
        ("dwi", &DWI_SUFFIXES),
    ];
    vocabularies.iter().find_map(|(purpose, suffixes)| {
        suffixes
            .iter()
            .find(|suffix| suffix.eq_ignore_ascii_case(value))
            .map(|suffix| (*purpose, *suffix))
    })
}

fn strip_subject_keys(stub: &mut EntitySet) {
    stub.remove("sub");
    stub.remove("ses");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_as_triple() {
        let entry = TranslationEntry::new("func", "task-rest_bold", IntendedFor::Unassigned);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!(["func", "task-rest_bold", "UNASSIGNED"]));
    }

    #[test]
    fn auto_translate_reproin() {
        let entry = auto_translate("func-bold_task-rest_acq-mb8");
        assert_eq!(entry.purpose, "func");
        assert_eq!(entry.stub, "task-rest_acq-mb8_bold");
        assert_eq!(entry.intended_for, IntendedFor::Unassigned);

        let entry = auto_translate("anat-t1w");
        assert_eq!(entry.purpose, "anat");
        assert_eq!(entry.stub, "T1w");
    }

    #[test]
    fn auto_translate_bare_suffix_and_fallback() {
        let entry = auto_translate("task-nback_bold");
        assert_eq!(entry.purpose, "func");
        assert_eq!(entry.stub, "task-nback_bold");

        let entry = auto_translate("localizer 3plane");
        assert!(entry.is_excluded());
    }
}
