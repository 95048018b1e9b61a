//! `init_afd` — the AFD supervisor binary.
//!
//! Parses CLI flags, builds `RuntimeConfig`, runs the §4.6 startup
//! sequence, then ticks until a SIGINT/SIGTERM is observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use afd_core::config::Cli;
use afd_core::log::init_tracing;
use afd_core::shared::fsa::HostEntry;
use afd_core::supervisor::{Supervisor, SupervisorCommand};
use afd_core::system_log;
use afd_core::log::Sign;
use afd_core::RuntimeConfig;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, request_shutdown as libc::sighandler_t);
        libc::signal(libc::SIGTERM, request_shutdown as libc::sighandler_t);
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse_args();
    let cfg = RuntimeConfig::from_cli(&cli).context("loading runtime configuration")?;

    install_signal_handlers();

    let hosts: Vec<HostEntry> = load_hosts(&cfg)?;
    let mut supervisor = Supervisor::startup(cfg.clone(), hosts)
        .context("init_afd startup sequence failed")?;

    system_log!(Sign::Info, "entering tick loop (rescan_time={}s)", cfg.rescan_time_secs);

    while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
        let link_count = outgoing_link_count(&cfg).unwrap_or(0);
        supervisor.tick(link_count)?;
        std::thread::sleep(Duration::from_secs(cfg.rescan_time_secs));
    }

    system_log!(Sign::Info, "shutdown requested, stopping components");
    supervisor.handle_command(SupervisorCommand::Shutdown)?;

    let deadline = std::time::Instant::now() + Duration::from_secs(cfg.max_shutdown_time_secs);
    while std::time::Instant::now() < deadline {
        supervisor.tick(0)?;
        std::thread::sleep(Duration::from_millis(200));
    }

    supervisor.finish_shutdown()?;
    Ok(())
}

/// §4.6 step 2 reads `HOST_CONFIG` to populate the FSA; that parser is out
/// of scope here (Non-goal), so hosts come from an optional simple TOML
/// list under `<work_dir>/etc/hosts.toml` and default to none otherwise.
fn load_hosts(cfg: &RuntimeConfig) -> Result<Vec<HostEntry>> {
    let path = cfg.etc_dir().join("hosts.toml");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path).context("reading hosts.toml")?;
    let aliases: Vec<String> = toml::from_str::<HostsFile>(&text)
        .context("parsing hosts.toml")?
        .hosts;
    Ok(aliases
        .into_iter()
        .map(|alias| HostEntry::new(alias, cfg.max_no_parallel_jobs))
        .collect())
}

#[derive(serde::Deserialize)]
struct HostsFile {
    #[serde(default)]
    hosts: Vec<String>,
}

/// `st_nlink` of the outgoing file directory, the quantity the link-count
/// back-pressure check (§4.4) is measured against.
fn outgoing_link_count(cfg: &RuntimeConfig) -> Result<i64> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(cfg.files_dir().join("outgoing"))?;
    Ok(meta.nlink() as i64)
}
