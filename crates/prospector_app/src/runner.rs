//! Bridges the engine's event stream to console output.

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use prospector_core::{missing_key_field_fraction, TaskResult, DEFAULT_COMPLETENESS_THRESHOLD};
use prospector_engine::{EngineEvent, EngineHandle};

#[derive(Debug, Default)]
pub struct RunSummary {
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    pub stopped: bool,
}

/// Accepts `stop` (or `q`) on stdin and forwards it as a stop command.
pub fn spawn_stop_listener(handle: EngineHandle) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "stop" | "q" => {
                    let ack = handle.stop();
                    engine_info!("stop: {}", ack.message);
                }
                "" => {}
                other => engine_warn!("unknown command {other:?} (try \"stop\")"),
            }
        }
    });
}

/// Drains engine events until the run completes, printing one row per task.
///
/// Incomplete and failed tasks are shown as marked rows, never dropped.
pub fn drain_events(handle: &EngineHandle) -> RunSummary {
    let mut summary = RunSummary::default();
    loop {
        let Some(event) = handle.try_recv() else {
            thread::sleep(Duration::from_millis(20));
            continue;
        };
        match event {
            EngineEvent::TaskResolved { task_id, result } => {
                print_row(&task_id, &result, &mut summary);
            }
            EngineEvent::RunCompleted { stopped } => {
                summary.stopped = stopped;
                return summary;
            }
        }
    }
}

fn print_row(task_id: &str, result: &TaskResult, summary: &mut RunSummary) {
    match result {
        TaskResult::Record(record) => {
            let complete = missing_key_field_fraction(record) < DEFAULT_COMPLETENESS_THRESHOLD;
            let marker = if complete {
                summary.complete += 1;
                "ok     "
            } else {
                summary.partial += 1;
                "PARTIAL"
            };
            engine_info!(
                "{marker} {task_id}  title={:?} rank={:?} rating={:?} variants={:?} est_monthly={:?}",
                record.title.as_deref().unwrap_or("-"),
                record.sales_rank,
                record.rating,
                record.variant_count,
                record.estimated_monthly_sales
            );
        }
        TaskResult::Failed(failure) => {
            summary.failed += 1;
            engine_info!("FAILED  {task_id}  {}: {}", failure.kind, failure.message);
        }
    }
}
