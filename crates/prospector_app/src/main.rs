mod logging;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use engine_logging::engine_info;
use prospector_engine::{
    EngineConfig, EngineHandle, FetchSettings, HttpPageContext, SelectorExtractor,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::initialize();

    let mut args = std::env::args().skip(1);
    let (Some(source_url), Some(items_path)) = (args.next(), args.next()) else {
        eprintln!("usage: prospector_app <source-url> <item-id-file>");
        std::process::exit(2);
    };

    let items = read_item_ids(&items_path)?;
    if items.is_empty() {
        eprintln!("no item ids found in {items_path}");
        std::process::exit(2);
    }

    let config = EngineConfig {
        staging_dir: Some(PathBuf::from(".prospector_staging")),
        ..EngineConfig::default()
    };
    let context = Arc::new(HttpPageContext::new(FetchSettings::default())?);
    let handle = EngineHandle::new(config, context, Arc::new(SelectorExtractor));

    let ack = handle.start(&source_url, items);
    if !ack.accepted {
        eprintln!("start rejected: {}", ack.message);
        std::process::exit(1);
    }
    engine_info!("{} ({})", ack.message, Local::now().format("%Y-%m-%d %H:%M:%S"));
    engine_info!("type \"stop\" to cancel the run");

    runner::spawn_stop_listener(handle.clone());
    let summary = runner::drain_events(&handle);

    engine_info!(
        "run {} at {}: {} complete, {} partial, {} failed",
        if summary.stopped { "stopped" } else { "finished" },
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        summary.complete,
        summary.partial,
        summary.failed
    );
    Ok(())
}

/// One item id per line; blank lines and surrounding whitespace ignored.
fn read_item_ids(path: &str) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect())
}
