use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Architecture {
    #[value(name = "bpfel-unknown-none")]
    BpfEl,
    #[value(name = "bpfeb-unknown-none")]
    BpfEb,
}

impl Architecture {
    fn as_str(self) -> &'static str {
        match self {
            Architecture::BpfEl => "bpfel-unknown-none",
            Architecture::BpfEb => "bpfeb-unknown-none",
        }
    }

    /// Where cargo leaves the probe object for this target
    fn object_path(self) -> PathBuf {
        ["target", self.as_str(), "release", "iotap"].iter().collect()
    }
}

#[derive(Parser)]
enum Cmd {
    /// Build the probe object (iotap-ebpf)
    BuildEbpf {
        #[arg(long, value_enum, default_value = "bpfel-unknown-none")]
        target: Architecture,
    },
    /// Build the probes and the CLI, then run iotap under sudo
    Run {
        #[arg(long, value_enum, default_value = "bpfel-unknown-none")]
        target: Architecture,
        /// Arguments passed through to iotap
        #[arg(last = true)]
        run_args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target } => build_ebpf(target)?,
        Cmd::Run { target, run_args } => {
            build_ebpf(target)?;
            run(target, &run_args)?;
        }
    }

    Ok(())
}

fn build_ebpf(target: Architecture) -> Result<()> {
    // Debug builds of the probe pull in formatting code the BPF linker
    // rejects, so the object is always built with the release profile.
    let status = Command::new("cargo")
        .args(["+nightly", "build", "--package", "iotap-ebpf", "--target"])
        .arg(target.as_str())
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to build eBPF program")?;

    anyhow::ensure!(status.success(), "Failed to build eBPF program: {status}");

    println!("✓ eBPF program built successfully");
    println!("  Object: {}", target.object_path().display());

    Ok(())
}

fn run(target: Architecture, run_args: &[String]) -> Result<()> {
    let status = Command::new("cargo")
        .args(["build", "--release", "--package", "iotap"])
        .status()
        .context("Failed to build iotap")?;
    anyhow::ensure!(status.success(), "Failed to build iotap: {status}");

    let status = Command::new("sudo")
        .arg("-E")
        .arg(PathBuf::from_iter(["target", "release", "iotap"]))
        .arg("--object")
        .arg(target.object_path())
        .args(run_args)
        .status()
        .context("Failed to run iotap")?;
    anyhow::ensure!(status.success(), "iotap exited with {status}");

    Ok(())
}
