//! CSV reader producing a lazy sequence of raw rows.
//!
//! Decoding, delimiter resolution and header checks happen up front in
//! [`open`]; data rows are produced one at a time by [`RawRows`]. Quoting,
//! embedded delimiters and embedded newlines are handled by the `csv` crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{CsvError, CsvResult, SizeLimit, ValidationError};
use crate::models::RawRow;

const UTF8_BOM: &str = "\u{feff}";

// =============================================================================
// Options
// =============================================================================

/// Field delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// Detect from the header line.
    Auto,
    /// A single ASCII byte.
    Fixed(u8),
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::Fixed(b',')
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Delimiter::Auto),
            "\\t" | "tab" | "\t" => Ok(Delimiter::Fixed(b'\t')),
            s if s.len() == 1 && s.is_ascii() => Ok(Delimiter::Fixed(s.as_bytes()[0])),
            other => Err(format!("delimiter must be a single ASCII character, got '{}'", other)),
        }
    }
}

/// Text encoding of the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Iso8859_1,
    Windows1252,
    /// Detect with chardet.
    Auto,
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "iso-8859-1" | "latin-1" | "latin1" => Ok(TextEncoding::Iso8859_1),
            "windows-1252" | "cp1252" => Ok(TextEncoding::Windows1252),
            "auto" => Ok(TextEncoding::Auto),
            other => Err(format!("unsupported encoding '{}'", other)),
        }
    }
}

/// Injected size guards. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_bytes: Option<usize>,
    pub max_rows: Option<usize>,
}

/// How to read one upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub delimiter: Delimiter,
    pub encoding: TextEncoding,
    pub limits: Limits,
}

/// What was actually used to read the upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    /// Data rows read so far (malformed ones included).
    pub row_count: usize,
}

// =============================================================================
// Encoding and delimiter detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes, returning the text and the name of the encoding used.
pub fn decode_content(bytes: &[u8], encoding: TextEncoding) -> CsvResult<(String, String)> {
    let encoding = match encoding {
        TextEncoding::Auto => {
            let charset = detect_encoding(bytes);
            match detected_encoding(&charset) {
                Some(known) => known,
                // Unknown charset: keep whatever is readable as UTF-8
                None => return Ok(decode_lossy(bytes, &charset)),
            }
        }
        fixed => fixed,
    };

    let (text, name) = match encoding {
        TextEncoding::Iso8859_1 => (
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
            "iso-8859-1",
        ),
        TextEncoding::Windows1252 => (
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
            "windows-1252",
        ),
        _ => {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| CsvError::EncodingError(format!("invalid utf-8: {}", e)))?;
            (text, "utf-8")
        }
    };

    let text = match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    };

    Ok((text, name.to_string()))
}

/// Map a normalized chardet name onto a supported encoding.
fn detected_encoding(charset: &str) -> Option<TextEncoding> {
    match charset {
        "iso-8859-1" => Some(TextEncoding::Iso8859_1),
        "windows-1252" => Some(TextEncoding::Windows1252),
        "utf-8" => Some(TextEncoding::Utf8),
        _ => None,
    }
}

fn decode_lossy(bytes: &[u8], charset: &str) -> (String, String) {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(&text).to_string();
    (text, format!("{} (read as utf-8)", charset))
}

/// Render a delimiter for logs and CLI output; tab is shown as `\t`.
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Falls back to a comma when no candidate appears.
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.bytes().filter(|&b| b == sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// Lazy row sequence
// =============================================================================

/// Lazy, finite, non-restartable sequence of data rows.
///
/// Yields `Err(CsvError::RowShape { .. })` for records with the wrong field
/// count and keeps going; any other error ends the sequence.
pub struct RawRows {
    reader: csv::Reader<Cursor<Vec<u8>>>,
    header: Arc<[String]>,
    record: csv::StringRecord,
    rows_read: usize,
    max_rows: Option<usize>,
    info: CsvInfo,
    done: bool,
}

impl RawRows {
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Data rows produced so far.
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Parsing metadata, with the row count observed so far.
    pub fn info(&self) -> CsvInfo {
        CsvInfo {
            row_count: self.rows_read,
            ..self.info.clone()
        }
    }

    fn finish(&mut self, err: CsvError) -> Option<CsvResult<RawRow>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for RawRows {
    type Item = CsvResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    let row = self.rows_read + 1;
                    return self.finish(CsvError::Read {
                        row,
                        message: e.to_string(),
                    });
                }
                Ok(true) => {}
            }

            self.rows_read += 1;
            let row = self.rows_read;

            if let Some(limit) = self.max_rows {
                if row > limit {
                    return self.finish(CsvError::FileTooLarge(SizeLimit::Rows { limit }));
                }
            }

            if self.record.len() != self.header.len() {
                return Some(Err(CsvError::RowShape {
                    row,
                    expected: self.header.len(),
                    found: self.record.len(),
                }));
            }

            let values = self.record.iter().map(str::to_string).collect();
            return Some(Ok(RawRow::new(row, Arc::clone(&self.header), values)));
        }
    }
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

/// Decode the upload, read and check the header, and return the row sequence.
pub fn open(bytes: &[u8], options: &ParseOptions) -> CsvResult<RawRows> {
    if let Some(limit) = options.limits.max_bytes {
        if bytes.len() > limit {
            return Err(CsvError::FileTooLarge(SizeLimit::Bytes {
                limit,
                actual: bytes.len(),
            }));
        }
    }

    let (content, encoding) = decode_content(bytes, options.encoding)?;

    let delimiter = match options.delimiter {
        Delimiter::Auto => detect_delimiter(&content),
        Delimiter::Fixed(d) => d,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(content.into_bytes()));

    let mut record = csv::StringRecord::new();
    loop {
        let has_record = reader.read_record(&mut record).map_err(|e| CsvError::Read {
            row: 0,
            message: format!("cannot read header: {}", e),
        })?;
        if !has_record {
            return Err(CsvError::EmptyFile);
        }
        if !is_blank(&record) {
            break;
        }
    }

    let headers: Vec<String> = record.iter().map(|h| h.trim().to_string()).collect();
    check_header(&headers)?;

    let info = CsvInfo {
        encoding,
        delimiter: delimiter as char,
        headers: headers.clone(),
        row_count: 0,
    };

    Ok(RawRows {
        reader,
        header: headers.into(),
        record: csv::StringRecord::new(),
        rows_read: 0,
        max_rows: options.limits.max_rows,
        info,
        done: false,
    })
}

fn check_header(headers: &[String]) -> CsvResult<()> {
    let mut seen = HashSet::new();
    for (i, name) in headers.iter().enumerate() {
        if name.is_empty() {
            return Err(CsvError::MalformedHeader(format!("column {} has no name", i + 1)));
        }
        if !seen.insert(name.as_str()) {
            return Err(CsvError::MalformedHeader(format!(
                "duplicate column name '{}'",
                name
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Eager helpers (debug commands)
// =============================================================================

/// Fully drained parse, rows rendered as JSON objects.
#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    pub records: Vec<Value>,
    pub shape_errors: Vec<ValidationError>,
    pub info: CsvInfo,
}

/// Drain the row sequence into JSON objects, collecting row-shape errors.
pub fn parse_bytes(bytes: &[u8], options: &ParseOptions) -> CsvResult<ParseResult> {
    let mut rows = open(bytes, options)?;
    let mut records = Vec::new();
    let mut shape_errors = Vec::new();

    for item in rows.by_ref() {
        match item {
            Ok(row) => {
                let obj: Map<String, Value> = row
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect();
                records.push(Value::Object(obj));
            }
            Err(e) => match e.row_error() {
                Some(shape) => shape_errors.push(shape),
                None => return Err(e),
            },
        }
    }

    if rows.rows_read() == 0 {
        return Err(CsvError::EmptyFile);
    }

    Ok(ParseResult {
        records,
        shape_errors,
        info: rows.info(),
    })
}

/// Read a file from disk and parse it.
pub fn parse_file<P: AsRef<Path>>(path: P, options: &ParseOptions) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes(&bytes, options)
}
