//! Routes the engine's `tracing` events to the browser console.

use std::io;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleMethod {
    Error,
    Warn,
    Info,
    Debug,
    Log,
}

impl ConsoleMethod {
    fn for_level(level: Level) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            Level::INFO => Self::Info,
            Level::DEBUG => Self::Debug,
            _ => Self::Log,
        }
    }

    fn emit(self, line: &str) {
        let value = wasm_bindgen::JsValue::from_str(line);
        match self {
            Self::Error => web_sys::console::error_1(&value),
            Self::Warn => web_sys::console::warn_1(&value),
            Self::Info => web_sys::console::info_1(&value),
            Self::Debug => web_sys::console::debug_1(&value),
            Self::Log => web_sys::console::log_1(&value),
        }
    }
}

/// Buffers one formatted event and hands it to the console on drop.
pub struct ConsoleWriter {
    method: ConsoleMethod,
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim_end();
        if !line.is_empty() {
            self.method.emit(line);
        }
    }
}

pub struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            method: ConsoleMethod::Log,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            method: ConsoleMethod::for_level(*meta.level()),
            buf: Vec::new(),
        }
    }
}

/// Install the console subscriber. Debug builds also show `debug!` events.
pub fn init() {
    let max_level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let installed = tracing_subscriber::fmt()
        .with_writer(ConsoleMakeWriter)
        .with_max_level(max_level)
        .without_time()
        .try_init();
    if let Err(e) = installed {
        web_sys::console::warn_1(&format!("tracing subscriber not installed: {e}").into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_pick_matching_console_method() {
        assert_eq!(ConsoleMethod::for_level(Level::ERROR), ConsoleMethod::Error);
        assert_eq!(ConsoleMethod::for_level(Level::WARN), ConsoleMethod::Warn);
        assert_eq!(ConsoleMethod::for_level(Level::INFO), ConsoleMethod::Info);
        assert_eq!(ConsoleMethod::for_level(Level::DEBUG), ConsoleMethod::Debug);
        assert_eq!(ConsoleMethod::for_level(Level::TRACE), ConsoleMethod::Log);
    }

    #[test]
    fn writer_buffers_everything_it_is_given() {
        use std::io::Write;

        let mut writer = ConsoleWriter {
            method: ConsoleMethod::Warn,
            buf: Vec::new(),
        };
        writer.write_all(b" WARN ragmap_shared: ").expect("write");
        writer.write_all(b"no rendered point\n").expect("write");
        assert_eq!(writer.buf, b" WARN ragmap_shared: no rendered point\n");
        // Dropping would call into the browser console.
        writer.buf.clear();
    }
}
