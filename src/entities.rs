use std::fmt;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::error::BidsError;

pub const ENTITY_ORDER: [&str; 9] = [
    "sub", "ses", "task", "acq", "dir", "rec", "run", "echo", "part",
];

const COMPRESSED_EXTENSIONS: [&str; 3] = [".gz", ".bz2", ".xz"];

static ECHO_SUFFIX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?:^|_)e(\d+)(?:_|$)").ok());

/// Parsed filenames keep discovery order; keys added with `set` land in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySet {
    entities: Vec<(String, String)>,
    suffix: Option<String>,
    extension: String,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stub(stub: &str) -> Self {
        parse_stem(stub.trim())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.entities.iter_mut().find(|(name, _)| name == key) {
            slot.1 = value;
            return;
        }
        let rank = canonical_rank(key);
        let position = match rank {
            Some(rank) => self
                .entities
                .iter()
                .position(|(name, _)| canonical_rank(name).is_none_or(|other| other > rank))
                .unwrap_or(self.entities.len()),
            None => self.entities.len(),
        };
        self.entities.insert(position, (key.to_string(), value));
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entities.iter().position(|(name, _)| name == key)?;
        Some(self.entities.remove(index).1)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entities
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn set_suffix(&mut self, suffix: impl Into<String>) {
        self.suffix = Some(suffix.into());
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.set_suffix(suffix);
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = extension.into();
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.set_extension(extension);
        self
    }

    pub fn stem(&self) -> String {
        let mut segments = ENTITY_ORDER
            .iter()
            .filter_map(|key| self.get(key).map(|value| format!("{key}-{value}")))
            .collect::<Vec<_>>();
        if let Some(suffix) = self.suffix.as_deref().filter(|suffix| !suffix.is_empty()) {
            segments.push(suffix.to_string());
        }
        segments.join("_")
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.stem(), self.extension)
    }
}

impl fmt::Display for EntitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

fn canonical_rank(key: &str) -> Option<usize> {
    ENTITY_ORDER.iter().position(|known| *known == key)
}

pub fn strip_extensions(file_name: &str) -> (&str, &str) {
    let Some(dot) = file_name.rfind('.').filter(|dot| *dot > 0) else {
        return (file_name, "");
    };
    let last = &file_name[dot..];
    if COMPRESSED_EXTENSIONS.contains(&last) {
        let head = &file_name[..dot];
        if let Some(inner) = head.rfind('.').filter(|inner| *inner > 0) {
            return (&file_name[..inner], &file_name[inner..]);
        }
    }
    (&file_name[..dot], last)
}

pub fn parse(path: &Utf8Path) -> (EntitySet, Utf8PathBuf) {
    let directory = path.parent().map(Utf8Path::to_path_buf).unwrap_or_default();
    let file_name = path.file_name().unwrap_or_default();
    let (stem, extension) = strip_extensions(file_name);
    let set = parse_stem(stem).with_extension(extension);
    (set, directory)
}

pub fn build(set: &EntitySet, directory: &Utf8Path) -> Utf8PathBuf {
    directory.join(set.file_name())
}

fn parse_stem(stem: &str) -> EntitySet {
    let segments = stem.split('_').collect::<Vec<_>>();
    let recognised = segments.iter().any(|segment| {
        segment
            .split_once('-')
            .is_some_and(|(key, _)| canonical_rank(key).is_some())
    });
    // Without a single BIDS key the whole stem is the suffix.
    if !recognised {
        return EntitySet {
            entities: Vec::new(),
            suffix: (!stem.is_empty()).then(|| stem.to_string()),
            extension: String::new(),
        };
    }

    let mut set = EntitySet::new();
    let last = segments.len() - 1;
    for (index, segment) in segments.iter().enumerate() {
        match segment.split_once('-') {
            Some((key, value)) => set.entities.push((key.to_string(), value.to_string())),
            None if index == last => {
                if !segment.is_empty() {
                    set.suffix = Some(segment.to_string());
                }
            }
            // Interior unlabeled segments are kept as valueless keys.
            None => set.entities.push((segment.to_string(), String::new())),
        }
    }
    set
}

/// Fields of a dcm2niix output name `<subject>--<description>--<sequence>--<series>[_<suffix>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterName {
    pub directory: Utf8PathBuf,
    pub subject: String,
    pub description: String,
    pub sequence: String,
    pub series: u32,
    pub series_prefix: String,
    pub suffix: String,
}

impl ConverterName {
    pub fn parse(path: &Utf8Path) -> Result<Self, BidsError> {
        let directory = path.parent().map(Utf8Path::to_path_buf).unwrap_or_default();
        let file_name = path.file_name().unwrap_or_default();
        let (stem, _) = strip_extensions(file_name);

        let fields = stem.split("--").collect::<Vec<_>>();
        let [subject, description, sequence, series_field] = fields.as_slice() else {
            return Err(BidsError::InvalidConverterName(file_name.to_string()));
        };

        let (series, suffix) = match series_field.split_once('_') {
            Some((series, suffix)) => (series, suffix),
            None => (*series_field, ""),
        };
        let (series_prefix, digits) = match series.strip_prefix('s') {
            Some(digits) => ("s", digits),
            None => ("", series),
        };
        let series = digits
            .parse::<u32>()
            .map_err(|_| BidsError::InvalidConverterName(file_name.to_string()))?;

        Ok(Self {
            directory,
            subject: subject.to_string(),
            description: description.to_string(),
            sequence: sequence.to_string(),
            series,
            series_prefix: series_prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn echo_number(&self) -> Option<u32> {
        ECHO_SUFFIX
            .as_ref()?
            .captures(&self.suffix)
            .and_then(|caps| caps.get(1))
            .and_then(|value| value.as_str().parse().ok())
    }

    pub fn is_phase(&self) -> bool {
        self.suffix.ends_with("ph")
    }

    pub fn sibling(&self, series: u32, suffix: &str, extension: &str) -> Utf8PathBuf {
        let series_field = if suffix.is_empty() {
            format!("{}{series}", self.series_prefix)
        } else {
            format!("{}{series}_{suffix}", self.series_prefix)
        };
        self.directory.join(format!(
            "{}--{}--{}--{}{}",
            self.subject, self.description, self.sequence, series_field, extension
        ))
    }
}

pub fn image_to_sidecar(image: &Utf8Path) -> Utf8PathBuf {
    with_extension(image, ".json")
}

pub fn with_extension(path: &Utf8Path, extension: &str) -> Utf8PathBuf {
    let file_name = path.file_name().unwrap_or_default();
    let (stem, _) = strip_extensions(file_name);
    let renamed = format!("{stem}{extension}");
    match path.parent() {
        Some(parent) => parent.join(renamed),
        None => Utf8PathBuf::from(renamed),
    }
}
