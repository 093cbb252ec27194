use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunResult;
use crate::domain::ArchiveEntry;
use crate::store::ReconcileReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reconcile(report: &ReconcileReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_entries(entries: &[ArchiveEntry]) -> io::Result<()> {
        Self::print_json(entries)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn print_run_summary(result: &RunResult) {
    println!("{CYAN}feedkeeper summary{RESET}");
    for locale in &result.locales {
        println!(
            "  {} entries={} new={} duplicate={} seen={} errors={} ({} ms)",
            locale.locale,
            locale.entries,
            locale.downloaded,
            locale.duplicates,
            locale.seen_urls,
            locale.errors,
            locale.elapsed_ms
        );
    }
    println!("{GREEN}Found {} new images{RESET}", result.downloaded);
    println!("{YELLOW}Found {} duplicate images{RESET}", result.duplicates);
    println!("{YELLOW}Found {} urls already downloaded{RESET}", result.seen_urls);
    if result.errors > 0 {
        println!("{RED}{} images failed{RESET}", result.errors);
    }
    if result.cancelled {
        println!("{RED}Run cancelled before all locales were searched{RESET}");
    }
    println!("Duration {:.2} minutes", result.duration_secs / 60.0);
}

pub fn print_reconcile_summary(report: &ReconcileReport) {
    println!("{CYAN}fingerprint catalog{RESET}");
    println!("  loaded   {}", report.loaded);
    println!("  pruned   {}", report.pruned);
    println!("  added    {}", report.added);
    println!("{GREEN}  total    {}{RESET}", report.total);
}

pub fn print_entries(entries: &[ArchiveEntry]) {
    for entry in entries {
        println!(
            "{}-{}  {}  {}",
            entry.start_date, entry.end_date, entry.url_base, entry.headline
        );
    }
}
