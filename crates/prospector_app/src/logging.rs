//! Logging initialization for the prospector console runner.
//!
//! Output goes to the terminal and to `./prospector.log` in the working
//! directory; if the file cannot be created the runner logs to the terminal
//! only.

use std::fs::File;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

const LOG_FILE: &str = "./prospector.log";

pub fn initialize() {
    let level = LevelFilter::Info;
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    match File::create(LOG_FILE) {
        Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
        Err(err) => eprintln!("warning: could not create {LOG_FILE}: {err}"),
    }

    let _ = CombinedLogger::init(loggers);
}
