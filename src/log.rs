//! System log facade.
//!
//! The original AFD writes fixed-width lines to `system_log.fifo` with a
//! three-character sign tag (`<I>`, `<W>`, `<E>`, `<F>`, `<D>`, `<C>`,
//! `<#>`) at a known column. A log *writer* that formats those lines is
//! out of scope for this core; instead we route every event through
//! `tracing` with the sign carried as a structured field, so a writer
//! could still reconstruct the classic format from the event stream.

use tracing::{debug, error, info, warn};

/// The sign tags used throughout AFD's log channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// `<I>` informational / corrected-and-continued.
    Info,
    /// `<W>` warning, recoverable.
    Warn,
    /// `<E>` error.
    Error,
    /// `<F>` fatal, process is about to exit.
    Fatal,
    /// `<D>` debug/trace detail.
    Debug,
    /// `<C>` configuration change.
    Config,
    /// `<#>` offline sign, used instead of WARN/INFO once a host carries
    /// `HOST_ERROR_OFFLINE*`.
    Offline,
}

impl Sign {
    pub const fn tag(self) -> &'static str {
        match self {
            Sign::Info => "<I>",
            Sign::Warn => "<W>",
            Sign::Error => "<E>",
            Sign::Fatal => "<F>",
            Sign::Debug => "<D>",
            Sign::Config => "<C>",
            Sign::Offline => "<#>",
        }
    }
}

/// Emit one system-log event with the classic sign tag attached.
pub fn system_log(sign: Sign, target: &str, message: std::fmt::Arguments) {
    match sign {
        Sign::Fatal | Sign::Error => error!(sign = sign.tag(), target: "system_log", "{} {}", target, message),
        Sign::Warn => warn!(sign = sign.tag(), target: "system_log", "{} {}", target, message),
        Sign::Offline => warn!(sign = sign.tag(), target: "system_log", "{} {}", target, message),
        Sign::Info | Sign::Config => info!(sign = sign.tag(), target: "system_log", "{} {}", target, message),
        Sign::Debug => debug!(sign = sign.tag(), target: "system_log", "{} {}", target, message),
    }
}

/// Convenience macro mirroring the original's `system_log(SIGN, __FILE__,
/// __LINE__, "fmt", ...)` call sites.
#[macro_export]
macro_rules! system_log {
    ($sign:expr, $($arg:tt)*) => {
        $crate::log::system_log($sign, concat!(file!(), ":", line!()), format_args!($($arg)*))
    };
}

/// Install the process-wide `tracing` subscriber. Called once from
/// `main`; level is controlled by `RUST_LOG`/`AFD_LOG` the way
/// `hostpilot`'s `--verbose` wiring does.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("AFD_LOG")
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
