//! Human-facing status lines.
//!
//! Status text is part of the command contract, so it goes through a
//! [`Printer`] rather than `tracing`.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone)]
enum Sink {
    Stdout,
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// Writes status lines to stdout, stderr, or an in-memory buffer.
#[derive(Debug, Clone)]
pub struct Printer {
    sink: Sink,
}

impl Printer {
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    pub fn stderr() -> Self {
        Self { sink: Sink::Stderr }
    }

    /// A printer capturing into a shared buffer.
    pub fn buffer() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sink: Sink::Buffer(buffer.clone()),
            },
            buffer,
        )
    }

    /// Write one line. Write failures (e.g. a closed pipe) are ignored.
    pub fn line(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        let _ = match &self.sink {
            Sink::Stdout => writeln!(std::io::stdout().lock(), "{}", text),
            Sink::Stderr => writeln!(std::io::stderr().lock(), "{}", text),
            Sink::Buffer(buffer) => writeln!(buffer.lock(), "{}", text),
        };
    }
}
