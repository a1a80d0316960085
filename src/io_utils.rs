//! Delimited-file plumbing for the pipeline.
//!
//! - **Delimiters**: `.tsv` paths default to tab, everything else to comma,
//!   unless overridden.
//! - **Encoding**: input cells are decoded and output is transcoded through
//!   `encoding_rs`, defaulting to UTF-8.
//! - **stdin**: an input path of `-` reads standard input.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::QuoteStyle;
use encoding_rs::{EncoderResult, Encoding, UTF_8};
use log::debug;

use crate::error::{EngineError, Result};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| EngineError::UnknownEncoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

fn delimiter_for_extension(path: &Path) -> Option<u8> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => Some(DEFAULT_TSV_DELIMITER),
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Some(DEFAULT_CSV_DELIMITER),
        _ => None,
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided
        .or_else(|| delimiter_for_extension(path))
        .unwrap_or(DEFAULT_CSV_DELIMITER)
}

pub fn resolve_output_delimiter(path: &Path, provided: Option<u8>, fallback: u8) -> u8 {
    provided
        .or_else(|| delimiter_for_extension(path))
        .unwrap_or(fallback)
}

pub fn open_csv_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read + Send>>> {
    let reader: Box<dyn Read + Send> = if is_dash(path) {
        Box::new(io::stdin())
    } else {
        Box::new(BufReader::new(
            File::open(path).map_err(|err| EngineError::io(path, err))?,
        ))
    };
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(reader))
}

pub fn read_headers<R: Read>(
    reader: &mut csv::Reader<R>,
    path: &Path,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let headers = reader
        .byte_headers()
        .map_err(|err| EngineError::csv(format!("Reading headers of {path:?}"), err))?
        .clone();
    decode_record(&headers, path, encoding)
}

pub fn decode_record(
    record: &csv::ByteRecord,
    path: &Path,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| {
            let (text, _, had_errors) = encoding.decode(field);
            if had_errors {
                Err(EngineError::Decode {
                    path: path.to_path_buf(),
                    encoding: encoding.name(),
                })
            } else {
                Ok(text.into_owned())
            }
        })
        .collect()
}

/// Removes `path` if it exists; a missing file is not an error.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed previous output {path:?}");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(EngineError::io(path, err)),
    }
}

pub fn create_csv_writer(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write + Send>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| EngineError::io(parent, err))?;
    }
    let file = BufWriter::new(File::create(path).map_err(|err| EngineError::io(path, err))?);
    let sink: Box<dyn Write + Send> = if encoding == UTF_8 {
        Box::new(file)
    } else {
        Box::new(TranscodingWriter::new(file, encoding))
    };
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .from_writer(sink))
}

/// Re-encodes the UTF-8 produced by the CSV writer. Bytes of a character split
/// across two `write` calls are held back until the rest arrives.
struct TranscodingWriter<W: Write> {
    inner: W,
    encoder: encoding_rs::Encoder,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        TranscodingWriter {
            inner,
            encoder: encoding.new_encoder(),
            pending: Vec::new(),
        }
    }

    fn drain(&mut self) -> io::Result<()> {
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        };
        if complete == 0 {
            return Ok(());
        }

        let text = std::str::from_utf8(&self.pending[..complete])
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let mut remaining = text;
        let mut buffer = [0u8; 4096];
        loop {
            let (result, read, written) =
                self.encoder
                    .encode_from_utf8_without_replacement(remaining, &mut buffer, false);
            self.inner.write_all(&buffer[..written])?;
            remaining = &remaining[read..];
            match result {
                EncoderResult::InputEmpty => break,
                EncoderResult::OutputFull => continue,
                EncoderResult::Unmappable(ch) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "character {ch:?} cannot be encoded as {}",
                            self.encoder.encoding().name()
                        ),
                    ));
                }
            }
        }
        self.pending.drain(..complete);
        Ok(())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.drain()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.inner.flush()
    }
}
