use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging goes to stderr so reports on stdout stay pipeable. Setting
/// `SAMEWISE_LOG_FILE` appends a plain-text copy to that file; the returned
/// guard must stay alive for the writer to flush.
///
/// `RUST_LOG` overrides the default `info`-level filter for the samewise
/// crates.
pub fn init_logger() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("samewise=info,samewise_core=info,samewise_cli=info"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let (file_layer, guard) = match env::var("SAMEWISE_LOG_FILE") {
        Ok(path) => {
            let appender = tracing_appender::rolling::never(".", path);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}
