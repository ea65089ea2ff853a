use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::error::BidsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Created,
    Overwritten,
    Preserved,
}

impl WriteAction {
    pub fn decide(path: &Utf8Path, overwrite: bool) -> Self {
        match (path.as_std_path().is_file(), overwrite) {
            (false, _) => WriteAction::Created,
            (true, true) => WriteAction::Overwritten,
            (true, false) => WriteAction::Preserved,
        }
    }

    pub fn writes(self) -> bool {
        !matches!(self, WriteAction::Preserved)
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), BidsError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| BidsError::Filesystem(format!("create {path}: {err}")))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), BidsError> {
    let parent = path
        .parent()
        .ok_or_else(|| BidsError::Filesystem(format!("invalid destination path {path}")))?;
    ensure_dir(parent)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-bids")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BidsError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| BidsError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| BidsError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), BidsError> {
    let parent = dest
        .parent()
        .ok_or_else(|| BidsError::Filesystem(format!("invalid destination path {dest}")))?;
    ensure_dir(parent)?;
    let temp = tempfile::Builder::new()
        .prefix(".kira-bids")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BidsError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| BidsError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| BidsError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn safe_copy(source: &Utf8Path, dest: &Utf8Path, overwrite: bool) -> Result<WriteAction, BidsError> {
    let action = WriteAction::decide(dest, overwrite);
    let dest_name = dest.file_name().unwrap_or_default();
    match action {
        WriteAction::Created => info!(source = %source, "copying to {dest_name}"),
        WriteAction::Overwritten => info!(source = %source, "copying to {dest_name} (overwrite)"),
        WriteAction::Preserved => info!("preserving previous {dest_name}"),
    }
    if action.writes() {
        copy_file_atomic(source, dest)?;
    }
    Ok(action)
}

pub fn safe_write(path: &Utf8Path, content: &str, overwrite: bool) -> Result<WriteAction, BidsError> {
    let action = WriteAction::decide(path, overwrite);
    let name = path.file_name().unwrap_or_default();
    match action {
        WriteAction::Created => info!("creating {name}"),
        WriteAction::Overwritten => info!("overwriting previous {name}"),
        WriteAction::Preserved => info!("preserving previous {name}"),
    }
    if action.writes() {
        write_bytes_atomic(path, content.as_bytes())?;
    }
    Ok(action)
}

pub fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BidsError> {
    let mut items = Vec::new();
    let mut stack = vec![root.as_std_path().to_path_buf()];
    while let Some(path) = stack.pop() {
        for path in read_dir_sorted(&path)? {
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                items.push(to_utf8(path)?);
            }
        }
    }
    items.sort();
    Ok(items)
}

pub fn list_dirs(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BidsError> {
    read_dir_sorted(root.as_std_path())?
        .into_iter()
        .filter(|path| path.is_dir())
        .map(to_utf8)
        .collect()
}

pub fn list_files(
    root: &Utf8Path,
    filter: impl Fn(&str) -> bool,
) -> Result<Vec<Utf8PathBuf>, BidsError> {
    if !root.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    read_dir_sorted(root.as_std_path())?
        .into_iter()
        .filter(|path| path.is_file())
        .map(to_utf8)
        .filter(|path| match path {
            Ok(path) => path.file_name().is_some_and(&filter),
            Err(_) => true,
        })
        .collect()
}

fn read_dir_sorted(path: &Path) -> Result<Vec<PathBuf>, BidsError> {
    let entries = fs::read_dir(path)
        .map_err(|err| BidsError::Filesystem(format!("read {}: {err}", path.display())))?;
    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| BidsError::Filesystem(err.to_string()))?;
        items.push(entry.path());
    }
    items.sort();
    Ok(items)
}

fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, BidsError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| BidsError::Filesystem(format!("non-utf8 path {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_write_preserves_without_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("a/events.tsv")).unwrap();

        assert_eq!(safe_write(&path, "one\n", false).unwrap(), WriteAction::Created);
        assert_eq!(safe_write(&path, "two\n", false).unwrap(), WriteAction::Preserved);
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\n");
        assert_eq!(safe_write(&path, "two\n", true).unwrap(), WriteAction::Overwritten);
        assert_eq!(fs::read_to_string(&path).unwrap(), "two\n");
    }
}
