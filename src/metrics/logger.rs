//! Sinks for dumped metric rows.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::error::MetricError;
use super::registry::MetricRow;

/// Destination for one dumped row per epoch.
pub trait MetricsSink: Send {
    fn write(&mut self, row: &MetricRow) -> Result<(), MetricError>;

    fn flush(&mut self) -> Result<(), MetricError> {
        Ok(())
    }
}

/// Two-column key/value table on stdout.
pub struct ConsoleSink {
    key_width: usize,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { key_width: 28 }
    }

    fn render(&self, row: &MetricRow) -> String {
        let width = row
            .iter()
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or(0)
            .max(self.key_width);
        let rule = "-".repeat(width + 17);
        let mut out = format!("{}\n", rule);
        for (key, value) in row {
            out.push_str(&format!("| {:<width$} | {:>12.4} |\n", key, value, width = width));
        }
        out.push_str(&rule);
        out
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for ConsoleSink {
    fn write(&mut self, row: &MetricRow) -> Result<(), MetricError> {
        println!("{}", self.render(row));
        Ok(())
    }
}

/// CSV file with a header taken from the first row.
pub struct CsvSink {
    writer: BufWriter<File>,
    columns: Option<usize>,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MetricError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            columns: None,
        })
    }
}

impl MetricsSink for CsvSink {
    fn write(&mut self, row: &MetricRow) -> Result<(), MetricError> {
        match self.columns {
            None => {
                let header: Vec<&str> = row.iter().map(|(k, _)| k.as_str()).collect();
                writeln!(self.writer, "{}", header.join(","))?;
                self.columns = Some(row.len());
            }
            Some(expected) if expected != row.len() => {
                return Err(MetricError::HeaderMismatch {
                    expected,
                    got: row.len(),
                });
            }
            Some(_) => {}
        }
        let values: Vec<String> = row.iter().map(|(_, v)| format!("{}", v)).collect();
        writeln!(self.writer, "{}", values.join(","))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MetricError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Fan-out over several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: MetricsSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for MultiSink {
    fn write(&mut self, row: &MetricRow) -> Result<(), MetricError> {
        for sink in &mut self.sinks {
            sink.write(row)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MetricError> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
