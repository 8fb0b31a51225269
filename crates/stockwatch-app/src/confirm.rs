//! Overwrite confirmation for imports.

use async_trait::async_trait;
use std::io::{BufRead, Write};
use stockwatch_core::BulkKind;
use stockwatch_sync::OverwriteConfirm;
use tracing::warn;

/// Approves every overwrite (`--yes`).
pub struct AssumeYes;

#[async_trait]
impl OverwriteConfirm for AssumeYes {
    async fn confirm_overwrite(&self, _kind: BulkKind, _existing: usize) -> bool {
        true
    }
}

/// Asks on the terminal; anything but an explicit yes declines.
pub struct TerminalPrompt;

#[async_trait]
impl OverwriteConfirm for TerminalPrompt {
    async fn confirm_overwrite(&self, kind: BulkKind, existing: usize) -> bool {
        let question = format!(
            "{kind} already holds {existing} records and will be replaced. Continue? [y/N] "
        );
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            write!(stderr, "{question}")?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok::<_, std::io::Error>(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_yes(&line),
            Ok(Err(e)) => {
                warn!(error = %e, "Could not read confirmation, declining");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation prompt aborted, declining");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
