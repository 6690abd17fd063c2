//! Name → [`Pid`] resolution over `/proc`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::domain::Pid;

/// Find the one process called `name`, skipping iotap itself.
///
/// A process answers to its `comm` (from `/proc/<pid>/stat`) and to the
/// file name of its executable. A path argument is reduced to its file name.
///
/// # Errors
/// Fails if no process matches, or if several do.
pub fn find_process_by_name(name: &str) -> Result<Pid> {
    let own = std::process::id();
    let entries = fs::read_dir("/proc").context("Failed to read /proc")?;

    let matches: Vec<(Pid, String)> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|&pid| pid != own)
        .map(Pid)
        // kernel threads have no exe and drop out here
        .filter_map(|pid| Some((pid, read_names(pid)?)))
        .filter(|(_, (comm, exe))| answers_to(comm, exe, name))
        .map(|(pid, (comm, _))| (pid, comm))
        .collect();

    single_match(name, matches)
}

/// Executable of a running process, for the startup banner
///
/// # Errors
/// Fails if the process is gone or its `exe` link is unreadable.
pub fn resolve_exe_path(pid: Pid) -> Result<PathBuf> {
    let link = format!("{}/exe", pid.proc_path());
    fs::read_link(&link).with_context(|| format!("Cannot read {link}"))
}

/// `(comm, exe file name)` of `pid`, `None` when either is unreadable
fn read_names(pid: Pid) -> Option<(String, String)> {
    let exe = resolve_exe_path(pid).ok()?;
    let exe = exe.file_name()?.to_string_lossy().into_owned();
    let stat = fs::read_to_string(format!("{}/stat", pid.proc_path())).ok()?;
    Some((stat_comm(&stat)?.to_string(), exe))
}

/// `comm` out of a stat line, `"pid (comm) state ..."`. The name may itself
/// hold parentheses, so the last `)` closes it.
fn stat_comm(stat: &str) -> Option<&str> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    (open < close).then(|| &stat[open + 1..close])
}

fn answers_to(comm: &str, exe: &str, wanted: &str) -> bool {
    let wanted = wanted.rsplit('/').next().unwrap_or(wanted);
    !wanted.is_empty() && (comm.contains(wanted) || exe.contains(wanted))
}

fn single_match(name: &str, mut matches: Vec<(Pid, String)>) -> Result<Pid> {
    match matches.len() {
        0 => bail!(
            "No process matching '{name}' found.\n\
             Check running processes with: ps aux | grep {name}"
        ),
        1 => Ok(matches.remove(0).0),
        _ => {
            matches.sort();
            let list: Vec<String> =
                matches.iter().map(|(pid, comm)| format!("  {} ({comm})", pid.0)).collect();
            bail!(
                "Multiple processes match '{name}':\n{}\n\n\
                 Specify PID explicitly: iotap --pid <PID>",
                list.join("\n")
            )
        }
    }
}
