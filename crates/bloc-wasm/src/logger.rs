//! `log` backend writing to the browser console.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}", record.target(), record.args());
        #[cfg(target_arch = "wasm32")]
        {
            let line = wasm_bindgen::JsValue::from_str(&line);
            match record.level() {
                Level::Error => web_sys::console::error_1(&line),
                Level::Warn => web_sys::console::warn_1(&line),
                Level::Info => web_sys::console::info_1(&line),
                Level::Debug | Level::Trace => web_sys::console::debug_1(&line),
            }
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            if record.level() <= Level::Warn {
                eprintln!("{line}");
            }
        }
    }

    fn flush(&self) {}
}

/// Install the console logger once. Later calls only adjust the level.
pub fn init(level: LevelFilter) {
    // Fails when a logger is already set, which is fine.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}
