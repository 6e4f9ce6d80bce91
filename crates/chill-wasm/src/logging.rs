//! `tracing` output routed to the browser console

use std::io;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use wasm_bindgen::JsValue;

/// Install the console subscriber. Later calls keep the first one.
pub fn init(max_level: Level) {
    let installed = tracing_subscriber::fmt()
        .with_writer(ConsoleLog)
        .with_max_level(max_level)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .try_init();
    if installed.is_err() {
        web_sys::console::debug_1(&"[Chill WASM] tracing subscriber already installed".into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleMethod {
    Error,
    Warn,
    Info,
    Debug,
}

fn console_method(level: &Level) -> ConsoleMethod {
    match *level {
        Level::ERROR => ConsoleMethod::Error,
        Level::WARN => ConsoleMethod::Warn,
        Level::INFO => ConsoleMethod::Info,
        _ => ConsoleMethod::Debug,
    }
}

fn line_text(buffer: &[u8]) -> String {
    String::from_utf8_lossy(buffer).trim_end().to_string()
}

struct ConsoleLog;

impl<'a> MakeWriter<'a> for ConsoleLog {
    type Writer = ConsoleLine;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleLine::new(ConsoleMethod::Info)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleLine::new(console_method(meta.level()))
    }
}

/// One formatted event, written to the console when dropped
struct ConsoleLine {
    method: ConsoleMethod,
    buffer: Vec<u8>,
}

impl ConsoleLine {
    fn new(method: ConsoleMethod) -> Self {
        Self {
            method,
            buffer: Vec::new(),
        }
    }
}

impl io::Write for ConsoleLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleLine {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = JsValue::from_str(&line_text(&self.buffer));
        match self.method {
            ConsoleMethod::Error => web_sys::console::error_1(&text),
            ConsoleMethod::Warn => web_sys::console::warn_1(&text),
            ConsoleMethod::Info => web_sys::console::info_1(&text),
            ConsoleMethod::Debug => web_sys::console::debug_1(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_map_to_console_methods() {
        assert_eq!(console_method(&Level::ERROR), ConsoleMethod::Error);
        assert_eq!(console_method(&Level::WARN), ConsoleMethod::Warn);
        assert_eq!(console_method(&Level::INFO), ConsoleMethod::Info);
        assert_eq!(console_method(&Level::DEBUG), ConsoleMethod::Debug);
        assert_eq!(console_method(&Level::TRACE), ConsoleMethod::Debug);
    }

    #[test]
    fn test_line_text_drops_trailing_newline() {
        assert_eq!(
            line_text(b" WARN Autoplay blocked reason=\"NotAllowedError\"\n"),
            " WARN Autoplay blocked reason=\"NotAllowedError\""
        );
    }
}
