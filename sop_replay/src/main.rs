mod records;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use sop_status_board::{BoardState, ControlHandle, ServerConfig, StatusBus, start_server};
use sop_verify::{SessionError, StationConfig, VerificationPipeline, VerificationService, VerifierHandle, VerifyError};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Level, info, warn};

const USAGE: &str = "Usage: sop_replay <recording.jsonl|-> [--config <station.toml>] [--realtime] [--serve <addr>] [--verbose]";

#[derive(Debug)]
struct Options {
    recording: String,
    config_path: Option<String>,
    realtime: bool,
    serve_addr: Option<String>,
    verbose: bool,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut recording = None;
    let mut options = Options {
        recording: String::new(),
        config_path: None,
        realtime: false,
        serve_addr: None,
        verbose: false,
    };

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => options.config_path = Some(args.next().ok_or_else(|| anyhow!("--config needs a path"))?.clone()),
            "--serve" => options.serve_addr = Some(args.next().ok_or_else(|| anyhow!("--serve needs an address"))?.clone()),
            "--realtime" => options.realtime = true,
            "--verbose" => options.verbose = true,
            other if recording.is_none() => recording = Some(other.to_string()),
            other => return Err(anyhow!("unexpected argument `{}`", other)),
        }
    }

    options.recording = recording.ok_or_else(|| anyhow!("missing recording path"))?;
    Ok(options)
}

fn with_usage(e: anyhow::Error) -> anyhow::Error {
    anyhow!("{}\n{}", e, USAGE)
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Applies start/stop requests from the status board's web controls.
fn spawn_control_loop(handle: VerifierHandle, mut running_rx: watch::Receiver<bool>) {
    tokio::spawn(async move {
        while running_rx.changed().await.is_ok() {
            let running = *running_rx.borrow_and_update();
            let result = if running {
                handle.start().await
            } else {
                handle.stop().await.map(|_| ())
            };
            match result {
                Ok(()) => {}
                Err(VerifyError::Session(SessionError::AlreadyActive)) => info!("verification already running"),
                Err(VerifyError::Session(SessionError::ServiceClosed)) => break,
                Err(e) => warn!("control request failed: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(&args).map_err(with_usage)?;
    init_logging(options.verbose);

    // --- 2. Station Configuration ---
    let config = match &options.config_path {
        Some(path) => StationConfig::load(path).with_context(|| format!("loading station from {}", path))?,
        None => StationConfig::default(),
    };
    let pipeline = VerificationPipeline::from_config(&config)?;

    // --- 3. Recording ---
    let frames = if options.recording == "-" {
        records::read_frames(io::stdin().lock())?
    } else {
        let file = File::open(&options.recording).with_context(|| format!("opening {}", options.recording))?;
        records::read_frames(BufReader::new(file))?
    };
    info!(frames = frames.len(), "recording loaded");

    // --- 4. Service & Status Board ---
    let service = VerificationService::spawn(pipeline, config.queue_capacity);
    let bus = StatusBus::new(BoardState::new(config.instructions.clone()));
    let listener = bus.spawn_listener(service.subscribe());
    let handle = service.handle();

    let server = match &options.serve_addr {
        Some(addr) => {
            let (running_tx, running_rx) = watch::channel(true);
            spawn_control_loop(handle.clone(), running_rx);
            let cfg = ServerConfig { bind_addr: addr.clone() };
            Some(start_server(bus.clone(), cfg, ControlHandle { running_tx }).await?)
        }
        None => None,
    };

    // --- 5. Replay ---
    handle.start().await?;
    let started = Instant::now();
    let realtime = options.realtime;
    let source = futures::stream::iter(frames).then(move |frame| async move {
        if realtime {
            tokio::time::sleep_until(started + frame.timestamp).await;
        }
        frame
    });
    let forwarded = handle.forward(source).await?;

    // The snapshot round-trip guarantees every queued frame has been applied.
    let snapshot = handle.snapshot().await?;
    info!(forwarded, cycles = snapshot.cycle_count, "replay complete");

    if let Some(server) = server {
        info!("serving status board, press Ctrl-C to exit");
        tokio::signal::ctrl_c().await?;
        server.abort();
    }

    // --- 6. Final Board ---
    handle.stop().await?;
    service.shutdown().await?;
    listener.await?;
    println!("{}", bus.current().render_sidebar());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags_in_any_order() {
        let options = parse_args(&args(&["--realtime", "run.jsonl", "--config", "station.toml"])).unwrap();
        assert_eq!(options.recording, "run.jsonl");
        assert_eq!(options.config_path.as_deref(), Some("station.toml"));
        assert!(options.realtime);
        assert!(options.serve_addr.is_none());
        assert!(!options.verbose);
    }

    #[test]
    fn argument_errors_carry_the_usage_line() {
        let err = parse_args(&args(&[])).map_err(with_usage).unwrap_err();
        assert!(err.to_string().contains("missing recording path"));
        assert!(err.to_string().ends_with(USAGE));
    }

    #[test]
    fn rejects_missing_recording_and_extra_arguments() {
        assert!(parse_args(&args(&["--verbose"])).is_err());
        assert!(parse_args(&args(&["a.jsonl", "b.jsonl"])).is_err());
        assert!(parse_args(&args(&["a.jsonl", "--serve"])).is_err());
    }
}
