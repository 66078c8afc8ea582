//! Logging configuration

use std::sync::LazyLock;
use tracing_subscriber::{
    fmt, fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static HOSTNAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
});

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Resident memory of this process, e.g. `"12.3M"`.
fn memory_usage() -> String {
    use sysinfo::{Pid, System};

    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_process(pid);
    match system.process(pid) {
        Some(process) => format!("{:.1}M", process.memory() as f64 / (1024.0 * 1024.0)),
        None => "N/A".to_string(),
    }
}

pub fn init_logger() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(false)
                .with_level(true)
                .with_ansi(true)
                .compact(),
        )
        .init();
}

/// Like [`init_logger`], with source locations and a host/memory banner.
/// Useful when participants of one run are spread over several machines.
pub fn init_logger_detailed() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::rfc_3339())
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact(),
        )
        .init();

    tracing::info!(
        hostname = %*HOSTNAME,
        memory = %memory_usage(),
        "Logger initialized (detailed format)"
    );
}

#[cfg(feature = "json")]
pub fn init_logger_json() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .init();

    tracing::info!(hostname = %*HOSTNAME, "Logger initialized (JSON format)");
}

#[cfg(test)]
pub fn init_test_logger() {
    use tracing_subscriber::fmt::TestWriter;

    let _ = tracing_subscriber::registry()
        .with(env_filter("error"))
        .with(
            fmt::layer()
                .with_writer(TestWriter::default())
                .with_target(false)
                .with_ansi(false)
                .compact(),
        )
        .try_init();
}

pub fn hostname() -> &'static str {
    &HOSTNAME
}
