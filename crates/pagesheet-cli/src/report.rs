//! Human-readable run summaries.

use std::fmt::Write;

use pagesheet::RunOutcome;

/// Render the terminal status and every warning, one per line.
pub fn render_outcome(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    match outcome {
        RunOutcome::Completed { path, records } => {
            let _ = writeln!(out, "Completed: {records} records written to {}", path.display());
        }
        RunOutcome::CompletedWithWarnings {
            path,
            records,
            warnings,
        } => {
            let _ = writeln!(
                out,
                "Completed with {} warning(s): {records} records written to {}",
                warnings.len(),
                path.display()
            );
        }
        RunOutcome::Failed { reason, .. } => {
            let _ = writeln!(out, "Failed: {reason}");
        }
    }
    for w in outcome.warnings() {
        let _ = writeln!(out, "  warning: {} ({})", w.reason, w.url);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesheet::RunWarning;
    use std::path::PathBuf;

    #[test]
    fn test_render_failed_lists_warnings() {
        let outcome = RunOutcome::Failed {
            reason: "every URL failed".into(),
            warnings: vec![RunWarning {
                url: "https://a.example/".into(),
                reason: "HTTP 404 from https://a.example/".into(),
            }],
        };
        let text = render_outcome(&outcome);
        assert!(text.starts_with("Failed: every URL failed"));
        assert!(text.contains("warning: HTTP 404"));
    }

    #[test]
    fn test_render_completed() {
        let outcome = RunOutcome::Completed {
            path: PathBuf::from("out.xlsx"),
            records: 3,
        };
        assert_eq!(render_outcome(&outcome), "Completed: 3 records written to out.xlsx\n");
    }
}
