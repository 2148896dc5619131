//! Where per-case progress lines go.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug)]
pub enum Output {
    Console,
    File(BufWriter<File>),
    /// Kept in memory; used by tests.
    Capture(String),
    Null,
}

impl Output {
    pub fn file(path: &Path) -> io::Result<Self> {
        Ok(Output::File(BufWriter::new(File::create(path)?)))
    }

    pub fn capture() -> Self {
        Output::Capture(String::new())
    }

    /// Write one line. Log sink failures are reported through tracing and
    /// otherwise ignored so a full disk does not abort a run.
    pub fn log_output(&mut self, text: &str) {
        let result = match self {
            Output::Console => writeln!(io::stdout().lock(), "{text}"),
            Output::File(w) => writeln!(w, "{text}"),
            Output::Capture(buf) => {
                buf.push_str(text);
                buf.push('\n');
                Ok(())
            }
            Output::Null => Ok(()),
        };
        if let Err(error) = result {
            tracing::warn!(%error, "failed to write log output");
        }
    }

    pub fn captured(&self) -> Option<&str> {
        match self {
            Output::Capture(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Console => io::stdout().flush(),
            Output::File(w) => w.flush(),
            Output::Capture(_) | Output::Null => Ok(()),
        }
    }
}
