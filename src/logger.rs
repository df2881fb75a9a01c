use chrono::{SecondsFormat, Utc};
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

/// Append-only run transcript. Every message goes to the log file prefixed
/// with an RFC 3339 timestamp, and to stdout as-is.
pub struct RunLog {
    file: File,
}

impl RunLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    /// Write one line. The file write completes before this returns; there is
    /// no buffering beyond the OS append.
    pub fn line(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        let message = message.as_ref();
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        println!("{}", message);
        writeln!(self.file, "[{}] {}", timestamp, message)
    }
}
