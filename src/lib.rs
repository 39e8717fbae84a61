//! hardlinker - Scan for and hardlink identical files
//!
//! Deduplicates disk usage by finding files with byte-identical content
//! across directory trees and merging their storage into shared inodes
//! via hard links, preserving every path, file metadata, and existing
//! link relationships.

pub mod cli;
pub mod compare;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod index;
pub mod linker;
pub mod logging;
pub mod scanner;
pub mod stats;

use anyhow::Context;

use crate::cli::Cli;
use crate::config::Settings;
use crate::confirm::{AssumeYes, Confirm, StdinConfirm};
use crate::engine::Deduper;
use crate::error::ExitCode;
use crate::index::FingerprintIndex;
use crate::stats::Statistics;

/// Run the application: validate settings, scan, report, persist.
///
/// Configuration problems (bad roots, corrupt persistent index) abort
/// before any scanning with [`ExitCode::ConfigError`]; per-file
/// failures during the run are reported as they happen and summarized
/// in [`ExitCode::PartialSuccess`].
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("{}", e);
            return Ok(ExitCode::ConfigError);
        }
    };

    let policy = settings.match_policy();
    let index = match &settings.store_path {
        Some(path) => match index::store::load(path, &policy) {
            Ok(index) => index,
            Err(e) => {
                log::error!("{}", e);
                return Ok(ExitCode::ConfigError);
            }
        },
        None => FingerprintIndex::new(),
    };

    let dry_run = settings.dry_run;
    let store_path = settings.store_path.clone();

    let mut engine = Deduper::new(settings, index);
    let mut interactive = StdinConfirm::new();
    let mut assume_yes = AssumeYes;
    let confirm: &mut dyn Confirm = if cli.no_confirm {
        &mut assume_yes
    } else {
        &mut interactive
    };
    let summary = engine.run(confirm);
    let index = engine.into_index();

    if cli.print_previous {
        println!("{}", stats::report_already_linked(&index));
    }
    if cli.output {
        println!("{}", stats::report_new_links(&index));
    }
    if cli.statistics {
        let statistics = Statistics::compute(&index, dry_run);
        println!("{}", statistics.render(summary.elapsed, summary.skipped));
    } else if dry_run {
        println!("\nDRY RUN ONLY: No files were changed.");
    }

    if let Some(path) = store_path {
        if dry_run {
            log::debug!("Dry run: not saving index to {}", path.display());
        } else {
            index::store::save(&index, &path)
                .with_context(|| format!("saving index to {}", path.display()))?;
        }
    }

    Ok(if summary.has_errors() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}
