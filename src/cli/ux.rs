use crate::cli::output::{PloverOutput, PloverStatus};
use crate::migration::MigrationDirection;

use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use tracing::subscriber::SetGlobalDefaultError;


pub fn setup_logging(verbose: u8, quiet: bool, json: bool) -> Result<(), SetGlobalDefaultError> {
    if json {
        // Mute all logging if JSON output is enabled
        return tracing::subscriber::set_global_default(tracing::subscriber::NoSubscriber::default())
    }

    let level = if quiet {
        tracing::Level::ERROR
    } else { match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }};

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}


/// Renders the files a batch will touch, in execution order.
pub fn format_plan(direction: MigrationDirection, batch: u16, paths: &[PathBuf]) -> String {
    let mut output = format!("--- {} plan: batch {batch} ---", direction.noun());

    for (index, path) in paths.iter().enumerate() {
        // Writing into a String cannot fail.
        let _ = write!(&mut output, "\n{:>3}. {}", index + 1, path.display());
    }
    if matches!(direction, MigrationDirection::Down) {
        let _ = write!(&mut output, "\n\tWARNING: {} table(s) will be dropped!", paths.len());
    }

    output.push_str("\n--- End of plan ---");
    output
}

pub fn show_plan(direction: MigrationDirection, batch: u16, paths: &[PathBuf]) {
    if matches!(direction, MigrationDirection::Down) {
        tracing::warn!("Rollback of batch {batch} drops {} table(s)", paths.len());
    }
    tracing::info!("{}", format_plan(direction, batch, paths));
}


pub fn render_human_output<T: Serialize>(output: &PloverOutput<T>) {
    match output.status {
        PloverStatus::Success => println!("{} 🐦", output.message),
        PloverStatus::Error => eprintln!("{} failed: {}", output.command, output.message),
    }
}
