//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled probe object and attaches one tracepoint per operation
//! kind.
//!
//! ## Functions
//!
//! - [`load_ebpf_program()`] - Patch read-only globals, size `EVENTS`, load
//! - [`attach_probes()`] - Attach every program in the dispatch table
//! - [`init_ebpf_logger()`] - Forward in-probe `aya-log` messages to `log`
//!
//! The object is read from disk at runtime rather than embedded, so the
//! userspace crate builds without the BPF toolchain.

use aya::{programs::TracePoint, Ebpf, EbpfLoader, VerifierLogLevel};
use aya_log::EbpfLogger;
use iotap_common::config::{
    ProbeLogLevel, GLOBAL_BATCH_POLICY, GLOBAL_FAULT_POLICY, GLOBAL_LOG_LEVEL,
    GLOBAL_TARGET_TGID, GLOBAL_TRANSPORT_MODE, MAP_EVENTS,
};
use iotap_common::OperationKind;
use log::{info, warn};

use crate::config::TapConfig;
use crate::domain::TapError;

/// Load the probe object with the run's configuration baked into `.rodata`
///
/// # Errors
/// Returns an error if the object is missing or the verifier rejects it
pub fn load_ebpf_program(config: &TapConfig) -> Result<Ebpf, TapError> {
    if !config.object.is_file() {
        return Err(TapError::ObjectNotFound(config.object.display().to_string()));
    }

    let tgid = config.pid.0;
    let transport = config.transport as u8;
    let fault_policy = config.policy.fault as u8;
    let batch_policy = config.policy.batch as u8;
    let log_level = config.log_level as u8;

    let mut loader = EbpfLoader::new();
    loader
        .set_global(GLOBAL_TARGET_TGID, &tgid, true)
        .set_global(GLOBAL_TRANSPORT_MODE, &transport, true)
        .set_global(GLOBAL_FAULT_POLICY, &fault_policy, true)
        .set_global(GLOBAL_BATCH_POLICY, &batch_policy, true)
        .set_global(GLOBAL_LOG_LEVEL, &log_level, true)
        .set_max_entries(MAP_EVENTS, config.ring_bytes);
    if config.verifier_log {
        loader.verifier_log_level(VerifierLogLevel::VERBOSE | VerifierLogLevel::STATS);
    }

    let bpf = loader.load_file(&config.object).map_err(|e| TapError::ObjectLoadFailed {
        path: config.object.display().to_string(),
        error: e.to_string(),
    })?;
    info!("✓ Loaded {} (ring {} bytes)", config.object.display(), config.ring_bytes);
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf, level: ProbeLogLevel) {
    if level == ProbeLogLevel::Off {
        return;
    }
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Which kinds ended up instrumented
#[derive(Debug, Default)]
pub struct AttachSummary {
    pub attached: Vec<OperationKind>,
    /// Kinds whose tracepoint does not exist here, with the reason
    pub skipped: Vec<(OperationKind, String)>,
}

/// Attach every program in the dispatch table to its syscall tracepoint.
///
/// `recv`/`send` have no tracepoint of their own on most architectures (libc
/// routes them through `recvfrom`/`sendto`), so failing to attach those is a
/// warning. Any other failure is fatal.
///
/// # Errors
/// Returns an error if a mandatory probe cannot be loaded or attached
pub fn attach_probes(bpf: &mut Ebpf) -> Result<AttachSummary, TapError> {
    let mut summary = AttachSummary::default();

    for kind in OperationKind::ALL {
        match attach_one(bpf, kind) {
            Ok(()) => {
                info!("✓ Attached tracepoint: syscalls/{}", kind.tracepoint());
                summary.attached.push(kind);
            }
            Err(e) if !kind.is_portable() => {
                warn!("⚠️  Skipping {kind}: {e}");
                summary.skipped.push((kind, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    if summary.attached.is_empty() {
        return Err(TapError::NothingAttached);
    }
    Ok(summary)
}

fn attach_one(bpf: &mut Ebpf, kind: OperationKind) -> Result<(), TapError> {
    let program: &mut TracePoint = bpf
        .program_mut(kind.program())
        .ok_or_else(|| TapError::ProgramNotFound(kind.program().to_string()))?
        .try_into()?;
    program.load()?;
    program.attach("syscalls", kind.tracepoint()).map_err(|e| TapError::ProbeAttachFailed {
        program: kind.program().to_string(),
        tracepoint: kind.tracepoint().to_string(),
        error: e.to_string(),
    })?;
    Ok(())
}
