use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::data_io::OutputSink;
use crate::driver::ReplayDriver;
use crate::scrape::{Engine, EngineTuning};
use crate::types::{DataFormat, ScrapeConfig, ScrapeControl, ScrapeEvent};

pub struct RunnerOptions {
    pub config: ScrapeConfig,
    pub output_path: String,
    pub format: DataFormat,
    pub tuning: EngineTuning,
    pub quiet: bool,
}

/// Drives one replay collection run to completion and writes the export.
/// The engine owns the run; this loop only relays status lines, issues a
/// stop once the replay is exhausted, and sinks the final collection.
pub async fn run_headless(driver: ReplayDriver, options: RunnerOptions) -> anyhow::Result<usize> {
    let exhausted = driver.exhaustion_flag();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ScrapeEvent>();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<ScrapeControl>();

    let engine = Engine::with_tuning(driver, options.tuning, event_tx);
    let engine_task = tokio::spawn(engine.run(control_rx));
    let _ = control_tx.send(ScrapeControl::Start(options.config));

    let mut sink = OutputSink::new(&options.output_path, options.format)?;
    let mut stop_sent = false;
    let mut exported = 0usize;
    let mut tick = tokio::time::interval(Duration::from_millis(120));

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(ScrapeEvent::Status { message, item_count }) => {
                    if !options.quiet {
                        eprintln!("[{item_count}] {message}");
                    }
                }
                Some(ScrapeEvent::Complete { items, item_count }) => {
                    for item in &items {
                        sink.write_item(item)?;
                    }
                    sink.finalize()?;
                    exported = item_count;
                    break;
                }
                None => break,
            },
            _ = tick.tick() => {
                // A finite replay cannot satisfy an open-ended run on its
                // own; once the scroll runs past the last snapshot the only
                // remaining move is an external stop.
                if !stop_sent && exhausted.load(Ordering::Relaxed) {
                    let _ = control_tx.send(ScrapeControl::Stop);
                    stop_sent = true;
                }
            }
        }
    }

    drop(control_tx);
    if let Err(e) = engine_task.await {
        eprintln!("engine task join error: {e}");
    }

    info!(items = exported, output = %options.output_path, "export written");
    eprintln!(
        "finished collection: items={} output={}",
        exported, options.output_path
    );
    Ok(exported)
}
