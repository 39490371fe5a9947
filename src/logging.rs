use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber: human-readable console output plus a
/// daily-rolling JSON file under `logs/`. Our own request/tail tracing
/// goes to the same sinks as everything else; the file layer is
/// non-blocking so slow disks never stall a handler.
pub fn init() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "livetail.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("livetail=info,tower_http=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // The guard flushes buffered file output on drop; the subscriber
    // lives for the whole process, so leak it.
    std::mem::forget(guard);
}
