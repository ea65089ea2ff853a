use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::entities::EntitySet;
use crate::error::BidsError;
use crate::series::SeriesRecord;
use crate::translator::TranslationTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunNumber {
    Unnumbered,
    Numbered(u32),
}

impl RunNumber {
    pub fn number(self) -> Option<u32> {
        match self {
            RunNumber::Unnumbered => None,
            RunNumber::Numbered(run) => Some(run),
        }
    }

    pub fn apply(self, stub: &mut EntitySet) {
        if stub.contains("run") {
            return;
        }
        if let RunNumber::Numbered(run) = self {
            stub.set("run", run.to_string());
        }
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunNumber::Unnumbered => write!(f, "-"),
            RunNumber::Numbered(run) => write!(f, "{run}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunIndex {
    runs: Vec<RunNumber>,
}

impl RunIndex {
    pub fn get(&self, position: usize) -> RunNumber {
        self.runs
            .get(position)
            .copied()
            .unwrap_or(RunNumber::Unnumbered)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RunNumber> + '_ {
        self.runs.iter().copied()
    }
}

/// Groups are numbered from 1 in the order the records are given; singletons
/// stay unnumbered.
pub fn resolve(records: &[SeriesRecord], table: &TranslationTable) -> Result<RunIndex, BidsError> {
    let mut keys = Vec::with_capacity(records.len());
    for record in records {
        let entry = table.lookup(&record.description)?;
        let stub = EntitySet::from_stub(&entry.stub).stem();
        keys.push(format!("{stub}#{}", record.distinguishing_suffix()));
    }

    let mut sizes = HashMap::<&str, u32>::new();
    for key in &keys {
        *sizes.entry(key.as_str()).or_default() += 1;
    }

    let mut counters = HashMap::<&str, u32>::new();
    let runs = keys
        .iter()
        .map(|key| {
            if sizes.get(key.as_str()).copied().unwrap_or(0) < 2 {
                return RunNumber::Unnumbered;
            }
            let counter = counters.entry(key.as_str()).or_default();
            *counter += 1;
            RunNumber::Numbered(*counter)
        })
        .collect();

    Ok(RunIndex { runs })
}
