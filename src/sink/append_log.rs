//! Daily CSV append log.
//!
//! One file per UTC calendar date, `temperatures-YYYY-MM-DD.csv`, no header row.

use crate::reading::DecodedReading;
use chrono::NaiveDate;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppendLog {
    directory: PathBuf,
}

impl AppendLog {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// File holding the rows for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("temperatures-{}.csv", date.format("%Y-%m-%d")))
    }

    /// Append one row for `reading` to the file of its date, creating the file
    /// on first write.
    pub fn append(&self, reading: &DecodedReading) -> io::Result<()> {
        let path = self.path_for(reading.timestamp.date_naive());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", reading.to_csv_row())
    }
}
