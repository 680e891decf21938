use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Append-only protocol trace, one line per frame.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<File>>,
}

impl FileTracer {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Record a frame read from the client.
    pub fn inbound(&self, frame: &serde_json::Value) {
        self.line("<-", frame);
    }

    /// Record a frame written to the client.
    pub fn outbound(&self, frame: &serde_json::Value) {
        self.line("->", frame);
    }

    fn line(&self, direction: &str, frame: &serde_json::Value) {
        if let Ok(mut file) = self.file.lock() {
            _ = writeln!(file, "{direction} {frame}");
        }
    }
}
