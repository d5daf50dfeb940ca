//! Large-table confirmation.
//!
//! Before copying a table above [`LARGE_TABLE_THRESHOLD`] rows the run asks
//! for explicit approval. The check is a throughput and memory warning, not
//! a correctness check, so it can be switched off in configuration or
//! answered up front with [`AutoConfirm`].

use std::io::{BufRead, Write};
use std::sync::Mutex;

use tracing::info;

use crate::error::{MigrateError, Result};

/// Row count above which confirmation is required.
pub const LARGE_TABLE_THRESHOLD: u64 = 1_000_000;

/// Yes/no approval for a large migration.
pub trait ConfirmationGate: Send + Sync {
    /// Approve migrating `row_count` rows.
    ///
    /// Returns `UserCancelled` on an explicit no and
    /// `InvalidConfirmationInput` on anything unrecognized. May block.
    fn confirm(&self, row_count: u64) -> Result<()>;
}

/// Approves every run without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, row_count: u64) -> Result<()> {
        info!("Large table ({} rows) approved without prompting", row_count);
        Ok(())
    }
}

/// Interactive prompt over injected streams.
pub struct PromptConfirmation {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl PromptConfirmation {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Prompt on the process's stdin and stderr.
    pub fn stdio() -> Self {
        Self::new(
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stderr()),
        )
    }

    fn write_line(&self, text: &str, newline: bool) -> Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| MigrateError::MigrationFailed("confirmation output poisoned".into()))?;
        if newline {
            writeln!(out, "{text}")?;
        } else {
            write!(out, "{text}")?;
        }
        out.flush()?;
        Ok(())
    }
}

impl ConfirmationGate for PromptConfirmation {
    fn confirm(&self, row_count: u64) -> Result<()> {
        self.write_line(
            &format!(
                "Record count is greater than 1 million [{row_count} rows]. \
                 Migrating large tables may consume more memory. Proceed with caution!"
            ),
            true,
        )?;
        self.write_line("Do you want to proceed [y|n]? ", false)?;

        let mut answer = String::new();
        self.input
            .lock()
            .map_err(|_| MigrateError::MigrationFailed("confirmation input poisoned".into()))?
            .read_line(&mut answer)?;

        match parse_answer(&answer) {
            Answer::Yes => {
                self.write_line("Proceeding...", true)?;
                info!("Large table ({} rows): user chose to proceed", row_count);
                Ok(())
            }
            Answer::No => {
                info!("Large table ({} rows): user chose to cancel", row_count);
                Err(MigrateError::UserCancelled)
            }
            Answer::Invalid => {
                self.write_line("Invalid input", true)?;
                info!(
                    "Large table ({} rows): invalid confirmation input {:?}",
                    row_count,
                    answer.trim_end()
                );
                Err(MigrateError::InvalidConfirmationInput(
                    answer.trim_end().to_string(),
                ))
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Invalid,
}

/// Only the first non-blank character counts, case-insensitively.
fn parse_answer(line: &str) -> Answer {
    match line.trim_start().chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('y') => Answer::Yes,
        Some('n') => Answer::No,
        _ => Answer::Invalid,
    }
}
