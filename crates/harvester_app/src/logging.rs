//! Logger initialization for the harvester binary.
//!
//! Logs go to the terminal and are appended to `harvest.log` in the output root,
//! so every run leaves its trace next to what it captured.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

pub const LOG_FILE_NAME: &str = "harvest.log";

/// Installs the terminal logger and, when the log file can be opened, the file logger.
pub fn initialize(output_dir: &Path) {
    let level = LevelFilter::Info;
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    match open_log_file(output_dir) {
        Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
        Err(err) => eprintln!(
            "Warning: Could not open log file in {}: {err}",
            output_dir.display()
        ),
    }

    let _ = CombinedLogger::init(loggers);
}

pub fn log_file_path(output_dir: &Path) -> PathBuf {
    output_dir.join(LOG_FILE_NAME)
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn open_log_file(output_dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(output_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(output_dir))
}
