use std::cell::OnceCell;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::converter::{ConversionOptions, NiftiConverter};
use crate::domain::Label;
use crate::error::BidsError;
use crate::fmaps::{self, BindReport};
use crate::organize::{self, Pass, PopulateOptions, SessionContext, SessionReport};
use crate::series;
use crate::store::DatasetStore;
use crate::translator::{SaveOutcome, TranslationTable};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dataset: String,
    pub pass: Pass,
    pub translator: String,
    pub discovered: Vec<String>,
    pub translator_saved: Option<SaveOutcome>,
    pub sessions: Vec<SessionReport>,
    pub participants_added: Vec<String>,
    pub pruned_links: usize,
    pub fieldmaps: Vec<BindReport>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demographics {
    pub age: Option<String>,
    pub sex: Option<String>,
}

pub trait DemographicsSource {
    fn demographics(&self, dicom_dir: &Utf8Path) -> Demographics;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownDemographics;

impl DemographicsSource for UnknownDemographics {
    fn demographics(&self, _dicom_dir: &Utf8Path) -> Demographics {
        Demographics::default()
    }
}

#[derive(Clone)]
pub struct App<C: NiftiConverter, D: DemographicsSource> {
    store: DatasetStore,
    converter: C,
    demographics: D,
    converter_version: OnceCell<String>,
}

impl<C: NiftiConverter, D: DemographicsSource> App<C, D> {
    pub fn new(store: DatasetStore, converter: C, demographics: D) -> Self {
        Self {
            store,
            converter,
            demographics,
            converter_version: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Run one pass over the dataset.
    ///
    /// Without a translator this converts every session and writes a translator
    /// template; with one it populates the BIDS tree.
    pub fn run(&self, config: &ResolvedConfig, sink: &dyn ProgressSink) -> Result<RunReport, BidsError> {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; scanning {}", self.store.sourcedata_dir()),
            elapsed: None,
        });
        let subjects = self.subjects(config)?;
        self.store.ensure_layout(config.overwrite)?;

        let translator_path = self.store.translator_path();
        let mut table = TranslationTable::load(&translator_path)?;
        let pass = Pass::select(&table);
        info!(pass = ?pass, subjects = subjects.len(), "starting");
        sink.event(ProgressEvent {
            message: match pass {
                Pass::Discover => "phase=Discover; converting DICOM and building translator".to_string(),
                Pass::Populate => "phase=Populate; populating BIDS directory".to_string(),
            },
            elapsed: Some(start.elapsed()),
        });

        let mut report = RunReport {
            dataset: self.store.root().to_string(),
            pass,
            translator: translator_path.to_string(),
            discovered: Vec::new(),
            translator_saved: None,
            sessions: Vec::new(),
            participants_added: Vec::new(),
            pruned_links: 0,
            fieldmaps: Vec::new(),
        };

        for subject in &subjects {
            let sessions = self.sessions(subject, config)?;
            for session in &sessions {
                let session = session.as_ref().map(Label::as_str);
                sink.event(ProgressEvent {
                    message: match session {
                        Some(session) => format!("phase=Convert; sub-{subject} ses-{session}"),
                        None => format!("phase=Convert; sub-{subject}"),
                    },
                    elapsed: Some(start.elapsed()),
                });
                self.convert_if_needed(subject.as_str(), session, pass, config)?;

                let conversion_dir = self.store.conversion_dir(subject.as_str(), session);
                let records = series::scan_conversion_dir(&conversion_dir, subject.as_str(), session)?;
                match pass {
                    Pass::Discover => {
                        report
                            .discovered
                            .extend(organize::discover(&records, &mut table, config.auto));
                    }
                    Pass::Populate => {
                        let demographics = self
                            .demographics
                            .demographics(&self.store.dicom_dir(subject.as_str(), session));
                        let added = self.store.add_participant_record(
                            subject.as_str(),
                            demographics.age.as_deref(),
                            demographics.sex.as_deref(),
                        )?;
                        if added {
                            report.participants_added.push(subject.to_string());
                        }

                        let context = SessionContext {
                            subject: subject.to_string(),
                            session: session.map(str::to_string),
                            output_dir: organize::session_output_dir(
                                self.store.root(),
                                subject.as_str(),
                                session,
                            ),
                        };
                        let options = PopulateOptions {
                            flags: config.key_flags,
                            nifti_extension: config.nifti_extension(),
                            overwrite: config.overwrite,
                        };
                        report
                            .sessions
                            .push(organize::populate(&context, &records, &table, options)?);

                        if config.clean_conv_dir {
                            self.store.clean_conversion_dir(subject.as_str(), session)?;
                        }
                    }
                }
            }
        }

        if pass == Pass::Discover {
            sink.event(ProgressEvent {
                message: format!("phase=Store; writing {translator_path}"),
                elapsed: Some(start.elapsed()),
            });
            report.translator_saved = Some(table.save(&translator_path)?);
        }

        if pass == Pass::Populate && config.bind_fmaps {
            sink.event(ProgressEvent {
                message: "phase=Bind; binding nearest fieldmap to each functional series".to_string(),
                elapsed: Some(start.elapsed()),
            });
            for subject in &subjects {
                let subject_dir = self.store.subject_dir(subject.as_str());
                if !subject_dir.as_std_path().is_dir() {
                    continue;
                }
                report.fieldmaps.push(fmaps::bind(
                    &subject_dir,
                    config.use_sessions,
                    config.nifti_extension(),
                )?);
            }
        }

        if !config.skip_pruning {
            sink.event(ProgressEvent {
                message: "phase=Prune; removing dangling IntendedFor links".to_string(),
                elapsed: Some(start.elapsed()),
            });
            for subject in &subjects {
                report.pruned_links +=
                    fmaps::prune_intended_fors(&self.store.subject_dir(subject.as_str()), true)?;
            }
        }

        sink.event(ProgressEvent {
            message: "phase=Done; finished".to_string(),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    fn subjects(&self, config: &ResolvedConfig) -> Result<Vec<Label>, BidsError> {
        let found = self.store.source_subjects()?;
        if !config.subjects.is_empty() {
            return Ok(config.subjects.clone());
        }
        info!(count = found.len(), "found subjects in sourcedata");
        found.iter().map(|name| name.parse::<Label>()).collect()
    }

    fn sessions(&self, subject: &Label, config: &ResolvedConfig) -> Result<Vec<Option<Label>>, BidsError> {
        if !config.use_sessions {
            return Ok(vec![None]);
        }
        self.store
            .source_sessions(subject.as_str())?
            .iter()
            .map(|name| name.parse::<Label>().map(Some))
            .collect()
    }

    fn convert_if_needed(
        &self,
        subject: &str,
        session: Option<&str>,
        pass: Pass,
        config: &ResolvedConfig,
    ) -> Result<(), BidsError> {
        let conversion_dir = self.store.conversion_dir(subject, session);
        let needs_converting = !conversion_dir.as_std_path().is_dir();
        if pass == Pass::Populate && !needs_converting {
            return Ok(());
        }
        if self.converter_version.get().is_none() {
            let version = self.converter.check_version()?;
            let _ = self.converter_version.set(version);
        }
        let dicom_dir = self.store.dicom_dir(subject, session);
        self.converter.convert(
            &dicom_dir,
            &conversion_dir,
            ConversionOptions {
                compression: config.compression,
                anonymize: config.anonymize,
            },
        )
    }
}
