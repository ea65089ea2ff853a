use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let line = match event.elapsed {
            Some(elapsed) => format!("[{:>6.1}s] {}", elapsed.as_secs_f64(), event.message),
            None => format!("[   ...] {}", event.message),
        };
        let mut stderr = io::stderr();
        let _ = writeln!(stderr, "{line}");
    }
}

impl ConsoleOutput {
    pub fn print_summary(result: &RunReport) {
        let organized: usize = result.sessions.iter().map(|s| s.organized.len()).sum();
        let excluded: usize = result.sessions.iter().map(|s| s.excluded.len()).sum();
        let bound: usize = result.fieldmaps.iter().map(|f| f.bound.len()).sum();
        println!("kira-bids summary ({:?} pass)", result.pass);
        match result.pass {
            crate::organize::Pass::Discover => {
                println!("  protocols discovered: {}", result.discovered.len());
                println!("  translator: {}", result.translator);
                println!("  edit the translator, then rerun to populate the BIDS tree");
            }
            crate::organize::Pass::Populate => {
                println!("  series organized: {organized}");
                println!("  series excluded: {excluded}");
                println!("  participants added: {}", result.participants_added.len());
                println!("  fieldmaps bound: {bound}");
            }
        }
        println!("  IntendedFor links pruned: {}", result.pruned_links);
    }
}
