use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_bids::app::{App, UnknownDemographics};
use kira_bids::config::{ConfigLoader, ConfigOverrides};
use kira_bids::converter::Dcm2niix;
use kira_bids::domain::Compression;
use kira_bids::error::BidsError;
use kira_bids::output::{ConsoleOutput, JsonOutput, OutputMode};
use kira_bids::store::DatasetStore;

#[derive(Parser)]
#[command(name = "kira-bids")]
#[command(about = "Convert and organize Siemens DICOM sessions into a BIDS dataset via a protocol translator")]
#[command(version, author)]
struct Cli {
    /// BIDS dataset directory containing sourcedata/
    #[arg(short = 'd', long, default_value = ".")]
    dataset: Utf8PathBuf,

    /// Subject labels to process (default: every folder in sourcedata/)
    #[arg(long, num_args = 1..)]
    subjects: Vec<String>,

    /// DICOM folders are directly inside each subject folder
    #[arg(long)]
    no_sessions: bool,

    /// Overwrite existing files in the BIDS tree
    #[arg(long)]
    overwrite: bool,

    /// Bind nearest fieldmaps to functional series
    #[arg(long)]
    bind_fmaps: bool,

    /// Guess translator entries from ReproIn-style series descriptions
    #[arg(long)]
    auto: bool,

    /// Add an echo key to multi-echo series
    #[arg(long)]
    multiecho: bool,

    /// Add a part key to complex-valued series
    #[arg(long)]
    complex: bool,

    /// Add a rec key for bias-corrected reconstructions
    #[arg(long)]
    recon: bool,

    /// dcm2niix compression
    #[arg(long, value_enum)]
    compression: Option<Compression>,

    /// Remove work/ conversion folders after populating
    #[arg(long)]
    clean_conv_dir: bool,

    /// Keep dangling IntendedFor links
    #[arg(long)]
    skip_pruning: bool,

    /// Keep identifying fields in converter sidecars
    #[arg(long)]
    no_anon: bool,

    #[arg(long)]
    config: Option<Utf8PathBuf>,

    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BidsError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BidsError) -> u8 {
    match error {
        BidsError::MissingTranslation { .. } | BidsError::MissingSourcedata(_) => 2,
        BidsError::MissingTool(_) | BidsError::ToolVersion { .. } | BidsError::Conversion(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref(), &cli.dataset)?;
    let overrides = ConfigOverrides {
        subjects: cli.subjects,
        no_sessions: cli.no_sessions,
        overwrite: cli.overwrite,
        compression: cli.compression,
        echo: cli.multiecho,
        part: cli.complex,
        recon: cli.recon,
        bind_fmaps: cli.bind_fmaps,
        auto: cli.auto,
        clean_conv_dir: cli.clean_conv_dir,
        skip_pruning: cli.skip_pruning,
        no_anon: cli.no_anon,
    };
    let resolved = ConfigLoader::resolve_config(config, overrides)?;

    let app = App::new(DatasetStore::new(cli.dataset), Dcm2niix::new(), UnknownDemographics);
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(&resolved, &JsonOutput)?;
            JsonOutput::print_run(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.run(&resolved, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&result);
        }
    }
    Ok(())
}
