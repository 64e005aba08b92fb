//! Delimited-text plumbing shared by the CSV row source and the mismatch
//! exporter.
//!
//! - **Delimiter resolution**: `.tsv` → tab, everything else → comma, unless
//!   the caller overrides it.
//! - **Encoding**: input decoding and output transcoding via `encoding_rs`,
//!   defaulting to UTF-8.
//! - **Reader/writer construction**: `open_csv_reader_from_path` and
//!   `open_csv_writer`; a `-` output path writes to stdout.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::{DiffError, Result};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> anyhow::Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>, fallback: u8) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    if let Some(path) = path {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => return DEFAULT_TSV_DELIMITER,
            Some(ext) if ext.eq_ignore_ascii_case("csv") => return DEFAULT_CSV_DELIMITER,
            _ => {}
        }
    }
    fallback
}

/// Strict reader: ragged records surface as errors instead of being padded.
pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|err| DiffError::io(format!("Opening input file {path:?}"), err))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .delimiter(delimiter)
        .flexible(false)
        .from_reader(BufReader::new(file)))
}

pub fn open_csv_writer(
    path: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> anyhow::Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout()),
    };

    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> std::result::Result<String, String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(format!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> std::result::Result<Vec<String>, String> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Re-encodes UTF-8 written by the csv writer into the requested output
/// encoding. Incomplete trailing sequences wait in `pending` for the next
/// write.
struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            pending: Vec::new(),
        }
    }

    fn drain_complete(&mut self, at_end: bool) -> io::Result<()> {
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence in output stream",
                ));
            }
            Err(err) => err.valid_up_to(),
        };
        if at_end && valid_up_to < self.pending.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Incomplete UTF-8 sequence at end of output stream",
            ));
        }
        if valid_up_to == 0 {
            return Ok(());
        }
        let text = std::str::from_utf8(&self.pending[..valid_up_to])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let (encoded, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(&encoded)?;
        self.pending.drain(..valid_up_to);
        Ok(())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.drain_complete(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_complete(true)?;
        self.inner.flush()
    }
}
