// Rewrite the header row of a CSV file to snake_case column names, leaving the
// data rows untouched.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("file has no header row")]
    MissingHeader,
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Convert a column name to snake_case.
///  - surrounding whitespace (and a UTF-8 BOM) is dropped
///  - the name is lowercased
///  - every run of characters outside `[a-z0-9]` becomes one `_`
///  - trailing underscores are stripped
///
/// A leading underscore coming from leading punctuation is kept, so
/// `"% Occupied"` and `"Occupied"` stay distinct: `"_occupied"` vs `"occupied"`.
pub fn to_snake_case(name: &str) -> String {
    let name = name.trim_start_matches('\u{feff}').trim().to_lowercase();
    let name = NON_ALPHANUMERIC.replace_all(&name, "_");
    name.trim_end_matches('_').to_string()
}

/// Return the CSV with its header row rewritten by [`to_snake_case`].
///
/// Data rows are copied byte for byte from the input, in order.  Every row is
/// still parsed so that ragged or unparseable files are reported as errors.
pub fn normalize_csv(data: &[u8]) -> Result<Vec<u8>, NormalizeError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);
    let headers = rdr.byte_headers()?.clone();
    if headers.is_empty() {
        return Err(NormalizeError::MissingHeader);
    }
    let consumed = (rdr.position().byte() as usize).min(data.len());
    for record in rdr.byte_records() {
        record?;
    }

    // Where the header text ends, and which line terminator follows it.
    let header_end = data[..consumed]
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    let rest = &data[header_end..];
    let terminator: &[u8] = if rest.starts_with(b"\r\n") {
        b"\r\n"
    } else if rest.starts_with(b"\n") {
        b"\n"
    } else if rest.starts_with(b"\r") {
        b"\r"
    } else {
        b""
    };
    let body = &rest[terminator.len()..];

    let names: Vec<String> = headers
        .iter()
        .map(|field| to_snake_case(&String::from_utf8_lossy(field)))
        .collect();

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(names.join(",").as_bytes());
    out.extend_from_slice(terminator);
    out.extend_from_slice(body);
    Ok(out)
}
