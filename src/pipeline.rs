//! Streaming transform: reference table in memory, input in bounded batches.
//!
//! Run-level failures that can be detected up front (unreadable reference or
//! input, malformed reference rows, duplicate keys under `reject`) happen
//! before the previous output is touched. Once writing has started there is no
//! rollback: a failure mid-stream leaves the batches written so far in place.

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};

use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};

use crate::{
    config::{DEFAULT_BATCH_SIZE, EngineConfig},
    data::Record,
    engine::{OutputRecord, TransformationEngine},
    error::{EngineError, Result},
    io_utils,
    reference::{ReferenceIndex, ReferenceSettings},
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub delimiter: Option<u8>,
    pub output_delimiter: Option<u8>,
    pub input_encoding: &'static Encoding,
    pub output_encoding: &'static Encoding,
    pub reference: ReferenceSettings,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            delimiter: None,
            output_delimiter: None,
            input_encoding: UTF_8,
            output_encoding: UTF_8,
            reference: ReferenceSettings::default(),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        PipelineOptions {
            batch_size: config.batch_size,
            reference: config.reference.clone(),
            ..PipelineOptions::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub batches: usize,
    pub field_errors: usize,
    pub output: PathBuf,
}

/// Reads a whole delimited table into memory.
pub fn read_table(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<Record>> {
    let mut reader = BatchReader::open(path, delimiter, encoding, usize::MAX)?;
    Ok(reader.next_batch()?.unwrap_or_default())
}

pub fn load_reference(
    path: &Path,
    options: &PipelineOptions,
) -> Result<ReferenceIndex> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let rows = read_table(path, delimiter, options.input_encoding)?;
    let index = ReferenceIndex::build(rows, &options.reference)?;
    let (primary, secondary) = index.key_counts();
    info!(
        "Indexed {} reference row(s) from {:?} ({} {} key(s), {} {} key(s))",
        index.len(),
        path,
        primary,
        options.reference.primary_key,
        secondary,
        options.reference.secondary_key
    );
    Ok(index)
}

/// Runs the full transform, replacing whatever was at `output`.
pub fn process(
    engine: &TransformationEngine,
    input: &Path,
    reference: &Path,
    output: &Path,
    options: &PipelineOptions,
) -> Result<RunSummary> {
    if options.batch_size == 0 {
        return Err(EngineError::InvalidConfig(
            "batch size must be at least 1".to_string(),
        ));
    }
    let index = load_reference(reference, options)?;

    let delimiter = io_utils::resolve_input_delimiter(input, options.delimiter);
    let output_delimiter =
        io_utils::resolve_output_delimiter(output, options.output_delimiter, delimiter);
    let mut batches = BatchReader::open(input, delimiter, options.input_encoding, options.batch_size)?;

    io_utils::remove_if_exists(output)?;
    let mut writer = io_utils::create_csv_writer(output, output_delimiter, options.output_encoding)?;
    let columns = engine.columns();
    writer
        .write_record(columns)
        .map_err(|err| EngineError::csv(format!("Writing header to {output:?}"), err))?;

    info!(
        "Transforming {:?} -> {:?} in batches of {} (delimiter '{}', output '{}')",
        input,
        output,
        options.batch_size,
        crate::printable_delimiter(delimiter),
        crate::printable_delimiter(output_delimiter)
    );

    let mut summary = RunSummary {
        rows: 0,
        batches: 0,
        field_errors: 0,
        output: output.to_path_buf(),
    };
    while let Some(batch) = batches.next_batch()? {
        let rows = transform_batch(engine, &index, &batch);
        write_batch(&mut writer, columns, &rows, output)?;
        summary.batches += 1;
        summary.rows += rows.len();
        summary.field_errors += rows.iter().map(OutputRecord::error_count).sum::<usize>();
        debug!(
            "Batch {} flushed: {} row(s), {} total",
            summary.batches,
            rows.len(),
            summary.rows
        );
    }
    writer
        .flush()
        .map_err(|err| EngineError::io(output, err))?;

    info!(
        "Wrote {} row(s) in {} batch(es) to {:?}",
        summary.rows, summary.batches, output
    );
    if summary.field_errors > 0 {
        warn!(
            "{} output cell(s) hold formula errors",
            summary.field_errors
        );
    }
    Ok(summary)
}

/// Evaluates the first `limit` input rows without writing anything.
pub fn preview(
    engine: &TransformationEngine,
    input: &Path,
    reference: Option<&Path>,
    limit: usize,
    options: &PipelineOptions,
) -> Result<Vec<OutputRecord>> {
    let index = match reference {
        Some(path) => load_reference(path, options)?,
        None => ReferenceIndex::build(Vec::new(), &options.reference)?,
    };
    let delimiter = io_utils::resolve_input_delimiter(input, options.delimiter);
    let mut reader = BatchReader::open(input, delimiter, options.input_encoding, limit.max(1))?;
    let batch = if limit == 0 {
        Vec::new()
    } else {
        reader.next_batch()?.unwrap_or_default()
    };
    Ok(transform_batch(engine, &index, &batch))
}

fn transform_batch(
    engine: &TransformationEngine,
    index: &ReferenceIndex,
    batch: &[Record],
) -> Vec<OutputRecord> {
    batch
        .iter()
        .map(|record| {
            let reference = index.resolve(record);
            engine.apply(record, &reference)
        })
        .collect()
}

fn write_batch<W: Write>(
    writer: &mut csv::Writer<W>,
    columns: &[String],
    rows: &[OutputRecord],
    output: &Path,
) -> Result<()> {
    for row in rows {
        writer
            .write_record(row.render(columns))
            .map_err(|err| EngineError::csv(format!("Writing row to {output:?}"), err))?;
    }
    writer.flush().map_err(|err| EngineError::io(output, err))
}

/// Pulls at most `batch_size` decoded records at a time from a delimited
/// source.
pub struct BatchReader {
    reader: csv::Reader<Box<dyn Read + Send>>,
    path: PathBuf,
    headers: Vec<String>,
    encoding: &'static Encoding,
    batch_size: usize,
    record: ByteRecord,
    rows_read: usize,
    exhausted: bool,
}

impl BatchReader {
    pub fn open(
        path: &Path,
        delimiter: u8,
        encoding: &'static Encoding,
        batch_size: usize,
    ) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader(path, delimiter)?;
        let headers = io_utils::read_headers(&mut reader, path, encoding)?;
        Ok(BatchReader {
            reader,
            path: path.to_path_buf(),
            headers,
            encoding,
            batch_size: batch_size.max(1),
            record: ByteRecord::new(),
            rows_read: 0,
            exhausted: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// `Ok(None)` once the source is exhausted; never yields an empty batch.
    pub fn next_batch(&mut self) -> Result<Option<Vec<Record>>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut batch = Vec::with_capacity(self.batch_size.min(DEFAULT_BATCH_SIZE));
        while batch.len() < self.batch_size {
            let more = self.reader.read_byte_record(&mut self.record).map_err(|err| {
                EngineError::csv(
                    format!("Reading row {} of {:?}", self.rows_read + 2, self.path),
                    err,
                )
            })?;
            if !more {
                self.exhausted = true;
                break;
            }
            let cells = io_utils::decode_record(&self.record, &self.path, self.encoding)?;
            batch.push(Record::from_row(&self.headers, cells));
            self.rows_read += 1;
        }
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn batch_reader_splits_rows_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        fs::write(&path, "a,b\n1,2\n3,4\n5,6\n").unwrap();

        let mut reader = BatchReader::open(&path, b',', UTF_8, 2).unwrap();
        assert_eq!(reader.headers(), &["a".to_string(), "b".to_string()]);
        assert_eq!(reader.next_batch().unwrap().unwrap().len(), 2);
        assert_eq!(reader.next_batch().unwrap().unwrap().len(), 1);
        assert!(reader.next_batch().unwrap().is_none());
        assert!(reader.next_batch().unwrap().is_none());
        assert_eq!(reader.rows_read(), 3);
    }

    #[test]
    fn header_only_source_yields_no_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "a,b\n").unwrap();
        let mut reader = BatchReader::open(&path, b',', UTF_8, 10).unwrap();
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn ragged_row_is_a_run_level_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.csv");
        fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        let mut reader = BatchReader::open(&path, b',', UTF_8, 10).unwrap();
        let err = reader.next_batch().unwrap_err();
        assert!(err.to_string().contains("Reading row 3"), "{err}");
    }
}
