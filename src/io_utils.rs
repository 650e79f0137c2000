//! I/O utilities: encoding resolution, delimited reading, and CSV writing.
//!
//! Source extracts arrive in whatever charset the upstream system used.
//! [`read_delimited`] tries [`CANDIDATE_ENCODINGS`] in order and keeps the
//! first one that decodes the whole file without a malformed sequence, then
//! parses the text with the `csv` crate into a [`Frame`] with normalized
//! headers.

use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1251, WINDOWS_1252};
use log::debug;

use crate::{
    data::Frame,
    error::{LoadError, LoadResult},
};

pub const DEFAULT_SOURCE_DELIMITER: u8 = b';';
pub const DEFAULT_EXCHANGE_DELIMITER: u8 = b',';

/// Tried in order after any byte-order mark has been honoured.
/// `windows-1252` maps every byte, so it is the last resort. `windows-1251`
/// is refused for input containing 0x98, its one unassigned code point.
pub const CANDIDATE_ENCODINGS: &[&Encoding] = &[UTF_8, WINDOWS_1251, WINDOWS_1252];

/// encoding_rs maps byte 0x98 of windows-1251 to this C1 control instead of
/// rejecting it.
const UNASSIGNED_CP1251: char = '\u{98}';

#[derive(Debug)]
pub struct DecodedText {
    pub encoding: &'static Encoding,
    pub text: String,
}

/// Decodes `bytes` with the first candidate that succeeds without errors.
/// Returns `None` when no candidate can decode the input.
pub fn decode_with_candidates(
    bytes: &[u8],
    candidates: &[&'static Encoding],
) -> Option<DecodedText> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes)
        && let Some(text) =
            encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
    {
        return Some(DecodedText {
            encoding,
            text: text.into_owned(),
        });
    }
    candidates.iter().copied().find_map(|encoding| {
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .filter(|text| encoding != WINDOWS_1251 || !text.contains(UNASSIGNED_CP1251))
            .map(|text| DecodedText {
                encoding,
                text: text.into_owned(),
            })
    })
}

/// Reads and decodes a whole file, failing with `UnreadableFile` when every
/// candidate encoding rejects it.
pub fn read_text(path: &Path, candidates: &[&'static Encoding]) -> LoadResult<DecodedText> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded =
        decode_with_candidates(&bytes, candidates).ok_or_else(|| LoadError::UnreadableFile {
            path: path.to_path_buf(),
            tried: candidates.iter().map(|e| e.name().to_string()).collect(),
        })?;
    debug!("Decoded {:?} as {}", path, decoded.encoding.name());
    Ok(decoded)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

/// Parses decoded text into a frame whose headers are already normalized.
pub fn parse_delimited(text: &str, delimiter: u8, path: &Path) -> LoadResult<Frame> {
    let parse_error = |err: csv::Error| LoadError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let mut reader = open_csv_reader(text.as_bytes(), delimiter, true);
    let headers = reader.headers().map_err(parse_error)?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    Ok(Frame::from_text(headers.iter(), rows))
}

/// Encoding resolution followed by delimited parsing.
pub fn read_delimited(path: &Path, delimiter: u8) -> LoadResult<Frame> {
    let decoded = read_text(path, CANDIDATE_ENCODINGS)?;
    parse_delimited(&decoded.text, delimiter, path)
}

pub fn csv_writer_for<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
