//! # iotap - Main Entry Point
//!
//! Attaches the I/O probes to one process, consumes what they publish until
//! Ctrl+C, the duration limit or the target's exit, then prints (and
//! optionally exports) the per-kind totals.

// Main function is intentionally long for clarity
#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result};
use aya::maps::RingBuf;
use clap::Parser;
use iotap_common::config::MAP_EVENTS;
use iotap_common::TransportMode;
use log::{error, info, warn};
use std::time::{Duration, Instant};

use iotap::cli::Args;
use iotap::config::{transport_name, TapConfig};
use iotap::domain::{ConfigError, ExitReason, Pid};
use iotap::export::{grouping_url, push_metrics, RunMetrics, TapReport};
use iotap::preflight::run_preflight_checks;
use iotap::probes::{
    attach_probes, display_statistics, display_summary, init_ebpf_logger, load_ebpf_program,
    print_probe_diagnostics, read_counters, read_probe_stats, EventAggregator,
};
use iotap::process_lookup::{find_process_by_name, resolve_exe_path};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATS_INTERVAL: Duration = Duration::from_secs(10);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_USAGE;
    }
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Resolve the target from either `iotap my-app` or `iotap --pid 1234`
fn resolve_pid(args: &Args) -> Result<Pid> {
    if let Some(ref name) = args.process {
        if args.pid.is_some() {
            anyhow::bail!(
                "Cannot use PROCESS argument with --pid.\n\n\
                 Use either:\n  \
                 iotap my-app              (by name)\n  \
                 iotap --pid 1234          (explicit PID)"
            );
        }
        return find_process_by_name(name);
    }

    if let Some(pid) = args.pid {
        return Ok(Pid::try_from(pid)?);
    }

    anyhow::bail!(
        "Missing required argument: PROCESS or --pid\n\n\
         Usage:\n  \
         iotap my-app              Find the process by name\n  \
         iotap --pid 1234          Explicit PID\n\n\
         Run 'iotap --help' for more options"
    )
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let pid = resolve_pid(&args)?;
    run_preflight_checks(&args.object, pid)?;
    let config = TapConfig::from_args(&args, pid)?;
    let push_url = args
        .push_gateway
        .as_deref()
        .map(|gateway| grouping_url(gateway, &config.report_labels()))
        .transpose()
        .context("Invalid --push-gateway")?;

    if !quiet {
        println!("iotap v{}", env!("CARGO_PKG_VERSION"));
        match resolve_exe_path(pid) {
            Ok(exe) => println!("target: {} ({})", pid.0, exe.display()),
            Err(_) => println!("target: {}", pid.0),
        }
        println!("transport: {}", transport_name(config.transport));
    }

    // ── Load and attach ─────────────────────────────────────────────────
    let mut bpf = load_ebpf_program(&config).context("Failed to load probes")?;
    init_ebpf_logger(&mut bpf, config.log_level);

    let summary = attach_probes(&mut bpf).context("Failed to attach probes")?;
    if !quiet {
        println!("probes: {} attached", summary.attached.len());
        for (kind, _) in &summary.skipped {
            println!("   skipped {kind}: no tracepoint on this kernel");
        }
    }

    let mut ring_buf = match config.transport {
        TransportMode::Stream => Some(RingBuf::try_from(
            bpf.take_map(MAP_EVENTS).context("EVENTS map not found")?,
        )?),
        TransportMode::Counters => None,
    };
    let mut aggregator = EventAggregator::new();

    if !quiet {
        if let Some(ref export_path) = args.export {
            println!("export: {}", export_path.display());
        }
        if let Some(ref url) = push_url {
            println!("push: {url}");
        }
    }

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let capture_start = Instant::now();
    let mut stats_timer = Instant::now();
    let mut waiting_notice = Instant::now();
    let proc_path = pid.proc_path();

    let exit_reason = loop {
        if config.duration.is_some_and(|limit| capture_start.elapsed() >= limit) {
            break ExitReason::DurationReached;
        }

        if !std::path::Path::new(&proc_path).exists() {
            break ExitReason::ProcessExited;
        }

        if let Some(ring) = ring_buf.as_mut() {
            while let Some(item) = ring.next() {
                if let Err(e) = aggregator.ingest(&item) {
                    warn!("{e}");
                }
            }
            if aggregator.total_events() == 0 && waiting_notice.elapsed() > STATS_INTERVAL {
                info!("Still waiting for events... (no events received yet)");
                waiting_notice = Instant::now();
            }
        }

        if !quiet && stats_timer.elapsed() > STATS_INTERVAL {
            match config.transport {
                TransportMode::Stream => display_statistics(&aggregator),
                TransportMode::Counters => match read_counters(&bpf) {
                    Ok(counters) => display_statistics(&EventAggregator::from_counters(&counters)),
                    Err(e) => warn!("Failed to read counters: {e}"),
                },
            }
            stats_timer = Instant::now();
        }

        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = &mut ctrl_c => break ExitReason::Interrupted,
        }
    };
    let elapsed = capture_start.elapsed();

    // Whatever was committed before we stopped
    if let Some(ring) = ring_buf.as_mut() {
        while let Some(item) = ring.next() {
            if let Err(e) = aggregator.ingest(&item) {
                warn!("{e}");
            }
        }
    }
    if config.transport == TransportMode::Counters {
        aggregator = EventAggregator::from_counters(
            &read_counters(&bpf).context("Failed to read COUNTERS map")?,
        );
    }

    let probe_stats = match read_probe_stats(&bpf) {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Probe diagnostics unavailable: {e}");
            None
        }
    };

    let report = TapReport::build(&config, &aggregator, probe_stats.as_ref(), elapsed, exit_reason);
    if !quiet {
        display_summary(&report);
        if let Some(ref stats) = probe_stats {
            print_probe_diagnostics(stats);
        }
    }

    if let Some(ref export_path) = args.export {
        report.save(export_path).context("Failed to export report")?;
        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    // A gateway that is down costs the metrics, not the run
    if let Some(url) = push_url {
        let pushed = match RunMetrics::collect(&aggregator) {
            Ok(metrics) => push_metrics(&reqwest::Client::new(), url, &metrics).await,
            Err(e) => Err(e),
        };
        match pushed {
            Ok(()) if !quiet => println!("pushed: per-kind totals"),
            Ok(()) => {}
            Err(e) => error!("Failed to push metrics: {e}"),
        }
    }

    Ok(())
}
