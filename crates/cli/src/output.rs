use crate::error::CliError;
use engine_core::state::models::Checkpoint;
use engine_runtime::execution::summary::RunSummary;
use std::path::Path;

pub fn print_summary(summary: &RunSummary, output: &Path, failed: &Path) {
    println!("Run '{}' {:?}:", summary.run_key, summary.status);
    println!("-----------------------------");
    println!("{:<18} {}", "Succeeded", summary.succeeded);
    println!("{:<18} {}", "Failed", summary.failed);
    println!("{:<18} {}", "Retries", summary.retries);
    println!("{:<18} {}", "Flushes", summary.flushes);
    println!("{:<18} {}", "Skipped (done)", summary.skipped_completed);
    println!("{:<18} {}", "Skipped (excl.)", summary.skipped_excluded);
    println!("{:<18} {}", "Completed total", summary.completed_total);
    println!("{:<18} {}", "Peak in flight", summary.peak_in_flight);
    println!("{:<18} {:.1}s", "Elapsed", summary.elapsed.as_secs_f64());
    println!("Results in {}", output.display());
    if !summary.failed_ids.is_empty() {
        println!(
            "{} item(s) failed, see {}",
            summary.failed_ids.len(),
            failed.display()
        );
    }
}

pub fn print_checkpoint(
    run_key: &str,
    checkpoint: Option<&Checkpoint>,
    as_json: bool,
) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }

    let Some(cp) = checkpoint else {
        println!("No checkpoint for run '{run_key}'");
        return Ok(());
    };

    println!("Progress for run '{run_key}':");
    println!("-----------------------------");
    println!("{:<16} {}", "Completed ids", cp.completed_ids.len());
    println!("{:<16} {}", "Still failed", cp.failures.len());
    println!("{:<16} {}", "Flushes", cp.last_flush_index);
    println!("{:<16} {} bytes", "Records file", cp.output.records);
    println!("{:<16} {} bytes", "Failures file", cp.output.failures);
    println!("{:<16} {}", "Updated", cp.updated_at.to_rfc3339());
    Ok(())
}
