// Opt-in browser logger: forwards `log` records to the JS console.
// Nothing is installed by default; an embedding Rust host may install its own logger instead.

use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console, js_name = error)]
    fn console_error(message: &str);
    #[wasm_bindgen(js_namespace = console, js_name = warn)]
    fn console_warn(message: &str);
    #[wasm_bindgen(js_namespace = console, js_name = log)]
    fn console_log(message: &str);
}

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
        let message = format_record(record.level(), record.target(), &record.args().to_string());
        match record.level() {
            Level::Error => console_error(&message),
            Level::Warn => console_warn(&message),
            _ => console_log(&message),
        }
    }

    fn flush(&self) {}
}

/// Parse a level name ("off", "error" .. "trace"). Unknown names mean `Info`.
pub fn level_filter(text: &str) -> LevelFilter {
    text.trim().parse().unwrap_or(LevelFilter::Info)
}

fn format_record(level: Level, target: &str, message: &str) -> String {
    format!("[{} {}] {}", level, target, message)
}

/// Route engine log records to the browser console.
///
/// The level applies on every call. Returns false when some logger was already installed,
/// in which case records keep going to that logger.
#[wasm_bindgen(js_name = enableLogging)]
pub fn enable_logging(level: &str) -> bool {
    let installed = log::set_logger(&LOGGER).is_ok();
    log::set_max_level(level_filter(level));
    installed
}
