use std::{path::Path, sync::OnceLock};

use tracing_subscriber::{prelude::*, registry::Registry, EnvFilter};

static GUARD: OnceLock<std::sync::Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

/// Install a global subscriber for tests.
///
/// Lock diagnostics (order violations, deadlock suspicions, usage errors) are
/// always printed. Set `RUST_LOG` to widen the filter, e.g. `RUST_LOG=debug`
/// to see every LOCKING/UNLOCKED transition of registries with tracing on.
/// With `DEBUG` set at build time a chrome trace is also written to `./log`.
pub fn setup_test_log() {
    color_backtrace::install();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt = tracing_subscriber::fmt::Layer::default()
        .with_test_writer()
        .with_thread_names(true)
        .with_line_number(true)
        .with_file(true);

    if option_env!("DEBUG").is_some() {
        let time_suffix = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();
        std::fs::create_dir_all("./log").unwrap();
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .include_args(true)
            .include_locations(true)
            .file(Path::new(
                format!("./log/trace-{}.json", time_suffix).as_str(),
            ))
            .build();
        GUARD.get_or_init(|| std::sync::Mutex::new(Some(guard)));
        let _ = tracing::subscriber::set_global_default(
            Registry::default().with(filter).with(fmt).with(chrome_layer),
        );
    } else {
        let _ = tracing::subscriber::set_global_default(Registry::default().with(filter).with(fmt));
    }
}
