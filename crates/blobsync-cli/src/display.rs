//! Terminal output for the BlobSync CLI

use blobsync_cdn::PurgeReport;
use blobsync_config::Settings;
use blobsync_sync::{WalkEvent, WalkReport};
use blobsync_types::Error;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::warn;

/// Spinner shown while the tree is walked
pub fn create_spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Scanning...");
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Drive `spinner` from walk events until the walker is dropped
pub fn spawn_progress(
    mut events: UnboundedReceiver<WalkEvent>,
    spinner: Option<ProgressBar>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut checked = 0u64;
        let mut uploaded = 0u64;
        let mut failed = 0u64;

        while let Some(event) = events.recv().await {
            let current = match event {
                WalkEvent::DirectoryEntered(path) => path,
                WalkEvent::FileChecked(path) => {
                    checked += 1;
                    path
                }
                WalkEvent::FileUploaded(path) => {
                    checked += 1;
                    uploaded += 1;
                    path
                }
                WalkEvent::EntryFailed(path) => {
                    failed += 1;
                    path
                }
            };

            if let Some(pb) = &spinner {
                let name = current
                    .file_name()
                    .map_or_else(|| current.display().to_string(), |n| n.to_string_lossy().into_owned());
                pb.set_message(format!(
                    "{checked} checked, {uploaded} uploaded, {failed} failed | {name}"
                ));
            }
        }

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
    })
}

/// Wait for the progress task; a crashed spinner never fails the run
pub async fn finish_progress(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!("Progress display stopped abnormally: {}", e);
    }
}

/// Print the outcome of the directory walk
pub fn print_walk_summary(container: &str, report: &WalkReport, elapsed: Duration) {
    let stats = &report.stats;
    println!();
    println!("{}", style("Sync Statistics:").bold().underlined());
    println!("  Container: {}", style(container).cyan());
    println!("  Files checked: {}", style(stats.files_checked).green());
    println!("  Files uploaded: {}", style(stats.files_uploaded).green());
    println!("  New objects: {}", style(stats.files_created).green());
    println!("  Unchanged: {}", style(stats.files_unchanged).yellow());
    println!("  Directories: {}", style(stats.directories_walked).green());
    println!(
        "  Errors: {}",
        if report.failures.is_empty() {
            style(report.failures.len()).green()
        } else {
            style(report.failures.len()).red()
        }
    );
    if let Some(watermark) = report.watermark {
        println!("  Watermark: {}", style(format_timestamp(watermark)).blue());
    }
    println!("  Duration: {}", style(format_duration(elapsed)).blue());

    if !report.changed_paths.is_empty() {
        println!("  Overwritten:");
        for path in report.changed_paths.iter() {
            println!("    • {}", style(path).dim());
        }
    }
    if report.cancelled {
        println!("{} Sync cancelled before completion", style("⚠").yellow().bold());
    }
}

/// Print the outcome of the cache purge
pub fn print_purge_summary(report: &PurgeReport) {
    println!();
    println!("{}", style("Cache Purge:").bold().underlined());
    for batch in &report.batches {
        println!(
            "  Batch {}/{}: {} paths, status {}",
            batch.batch_index,
            report.total_batches,
            batch.path_count,
            style(batch.status_code).green()
        );
    }
    if report.cancelled {
        println!(
            "{} Purge cancelled after {} of {} batches",
            style("⚠").yellow().bold(),
            report.batches.len(),
            report.total_batches
        );
    }
}

/// Print per-entry failures collected during the walk
pub fn print_failures(failures: &[Error]) {
    if failures.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{}", style("Failed entries:").red().bold().underlined());
    for failure in failures {
        eprintln!("  {} {}", style("✗").red(), failure);
    }
}

/// Print a fatal error together with the stage it stopped
pub fn print_stage_failure(error: &Error) {
    eprintln!(
        "{} {} failed: {}",
        style("✗").red().bold(),
        style(error.stage()).bold(),
        error
    );
}

/// Print the effective settings, secrets redacted
pub fn print_settings(settings: &Settings) {
    fn show(value: Option<&String>) -> String {
        value.map_or_else(|| style("<unset>").dim().to_string(), |v| style(v).cyan().to_string())
    }
    fn secret(value: Option<&String>) -> String {
        value.map_or_else(
            || style("<unset>").dim().to_string(),
            |_| style("<redacted>").yellow().to_string(),
        )
    }

    println!("{} Effective configuration:", style("⚙").blue().bold());
    println!("  client_id: {}", show(settings.client_id.as_ref()));
    println!("  subscription_id: {}", show(settings.subscription_id.as_ref()));
    println!("  private_key: {}", secret(settings.private_key.as_ref()));
    println!("  tenant_id: {}", show(settings.tenant_id.as_ref()));
    println!("  storage_account: {}", show(settings.storage_account.as_ref()));
    println!("  storage_access_key: {}", secret(settings.storage_access_key.as_ref()));
    println!("  concurrency: {}", style(settings.concurrency()).cyan());
    println!("  CDN:");
    println!("    resource_group: {}", show(settings.cdn.resource_group.as_ref()));
    println!("    profile: {}", show(settings.cdn.profile.as_ref()));
    println!("    endpoint: {}", show(settings.cdn.endpoint.as_ref()));
    if let Some(size) = settings.cdn.max_batch_size {
        println!("    max_batch_size: {}", style(size).cyan());
    }
    if let Some(delay) = settings.cdn.inter_batch_delay_secs {
        println!("    inter_batch_delay_secs: {}", style(delay).cyan());
    }
}

/// RFC 3339 rendering of a modification time
pub fn format_timestamp(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339()
}

/// Human-readable duration
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_millis(1500), "1.50s")]
    #[case(Duration::from_secs(200), "3m 20s")]
    #[case(Duration::from_secs(3723), "1h 2m 3s")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[tokio::test]
    async fn test_finish_progress_tolerates_crashed_spinner() {
        let crashed = tokio::spawn(async { panic!("spinner crashed") });
        finish_progress(crashed).await;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_progress(rx, None);
        tx.send(WalkEvent::FileChecked("a.txt".into())).unwrap();
        drop(tx);
        finish_progress(handle).await;
    }

    #[test]
    fn test_format_timestamp() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(format_timestamp(time), "1970-01-02T00:00:00+00:00");
    }
}
