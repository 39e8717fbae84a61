//! Interactive merge confirmation.
//!
//! The merge pipeline asks a [`Confirm`] capability before committing
//! each candidate pair. The interactive implementation is a tiny
//! ask → yes/no/all state machine over stdin; answering "all" disables
//! further prompting for the remainder of the run. Non-interactive runs
//! use [`AssumeYes`].

use std::io::{self, BufRead, Write};
use std::path::Path;

/// Capability consulted before each candidate merge.
pub trait Confirm {
    /// Whether the pair may be merged. A refusal skips only this pair.
    fn confirm_merge(&mut self, keep: &Path, link: &Path) -> bool;
}

/// Always confirms; used in no-confirmation mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm_merge(&mut self, _keep: &Path, _link: &Path) -> bool {
        true
    }
}

/// Prompts on stdin with a process-wide "confirm all" latch.
#[derive(Debug, Default)]
pub struct StdinConfirm {
    /// Set once the user answers "all"; no further prompts after that.
    all: bool,
}

impl StdinConfirm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ask(&mut self, keep: &Path, link: &Path) -> io::Result<bool> {
        let stdin = io::stdin();
        let mut input = String::new();
        loop {
            input.clear();
            print!(
                "Link {} to {}? (y/N/a): ",
                link.display(),
                keep.display()
            );
            io::stdout().flush()?;
            if stdin.lock().read_line(&mut input)? == 0 {
                // stdin closed: refuse rather than merge unseen
                return Ok(false);
            }
            match input.trim().to_uppercase().as_str() {
                "Y" | "YES" => return Ok(true),
                "N" | "NO" | "" => return Ok(false),
                "A" | "ALL" => {
                    self.all = true;
                    return Ok(true);
                }
                _ => continue,
            }
        }
    }
}

impl Confirm for StdinConfirm {
    fn confirm_merge(&mut self, keep: &Path, link: &Path) -> bool {
        if self.all {
            return true;
        }
        match self.ask(keep, link) {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("Confirmation prompt failed: {}", e);
                false
            }
        }
    }
}
