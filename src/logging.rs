use crate::error::{Error, Result};
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config as SLConfig, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Initialize logging utilities. This uses simplelog and log crates. This
/// calls static functions in those crates that need to be done once at the
/// beginning of the program. Once the initialization is complete, one may use
/// log macros such as `trace!()` and `warn!()` to emit log messages within
/// the rest of the codebase.
///
/// # Arguments
///
/// * `level_filter` - most verbose level to emit
/// * `log_file` - if given, log records are also appended to this file. Its
///   parent directories are created as needed.
///
/// # Errors
///
/// This function may throw the following errors:
///
/// * LoggerInitFailed
pub fn init(level_filter: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let log_config = SLConfig::default();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level_filter,
        log_config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(log_path) = log_file {
        if let Some(log_dir) = log_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(log_dir).map_err(|e| {
                Error::LoggerInitFailed(format!(
                    "Could not create log directories '{}': {:?}",
                    log_dir.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|e| {
                Error::LoggerInitFailed(format!(
                    "Could not create log file for WriteLogger: {:?}",
                    e
                ))
            })?;

        loggers.push(WriteLogger::new(level_filter, log_config, file));
    }

    CombinedLogger::init(loggers)
        .map_err(|e| Error::LoggerInitFailed(format!("Logger init failed: {:?}", e)))
}
