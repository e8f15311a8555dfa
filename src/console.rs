//! Shared output sink for the shell and the scheduler
//!
//! Workers print through a clone of the same `Console`, so each `println`
//! lands as one unbroken line.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

enum Sink {
    Stdout,
    Buffer(Vec<u8>),
}

#[derive(Clone)]
pub struct Console {
    sink: Arc<Mutex<Sink>>,
}

impl Console {
    pub fn stdout() -> Self {
        Console {
            sink: Arc::new(Mutex::new(Sink::Stdout)),
        }
    }

    /// A console that keeps everything in memory
    pub fn capture() -> Self {
        Console {
            sink: Arc::new(Mutex::new(Sink::Buffer(Vec::new()))),
        }
    }

    pub fn print(&self, text: &str) {
        let mut sink = self.sink.lock();
        match &mut *sink {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                // A closed stdout has nowhere left to report to
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            Sink::Buffer(buffer) => buffer.extend_from_slice(text.as_bytes()),
        }
    }

    pub fn println(&self, line: &str) {
        let mut text = String::with_capacity(line.len() + 1);
        text.push_str(line);
        text.push('\n');
        self.print(&text);
    }

    /// Everything captured so far; empty for a stdout console
    pub fn contents(&self) -> String {
        match &*self.sink.lock() {
            Sink::Stdout => String::new(),
            Sink::Buffer(buffer) => String::from_utf8_lossy(buffer).into_owned(),
        }
    }
}
