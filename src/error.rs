use camino::Utf8PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BidsError {
    #[error("invalid subject or session label: {0}")]
    #[diagnostic(help("labels may not contain '-' or '_'; rename the folder in sourcedata/ and rerun"))]
    InvalidLabel(String),

    #[error("invalid converter filename (expected <subject>--<description>--<sequence>--<series>): {0}")]
    InvalidConverterName(String),

    #[error("series description `{description}` is missing from the protocol translator")]
    #[diagnostic(help(
        "add an entry for this series; to skip it, set its purpose to EXCLUDE_BIDS_Directory instead of deleting the entry"
    ))]
    MissingTranslation { description: String },

    #[error("sourcedata folder not found in {0}")]
    #[diagnostic(help("kira-bids expects sourcedata/<subject>[/<session>] folders of DICOM series"))]
    MissingSourcedata(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to parse JSON in {path}: {message}")]
    JsonParse { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("{tool} {found} is too old, {required} or later is required")]
    ToolVersion {
        tool: String,
        found: String,
        required: String,
    },

    #[error("DICOM to NIfTI conversion failed: {0}")]
    Conversion(String),
}
