use crate::error::ReconcileError;
use csv::ReaderBuilder;

/// Guesses the field delimiter from the first non-empty line: tab if present, else comma.
pub fn detect_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

/// Splits delimited text into rows of fields.
///
/// Rows are returned in file order and with whatever width they have. Shape
/// checks belong to the caller, so a short row here is not an error.
pub fn parse_rows(text: &str, delimiter: Option<u8>) -> Result<Vec<Vec<String>>, csv::Error> {
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(text));
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

/// Parses a count such as `"12,345"` by dropping thousands separators first.
pub fn parse_count(value: &str) -> Result<f64, ReconcileError> {
    let stripped: String = value.chars().filter(|c| *c != ',').collect();
    match stripped.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ReconcileError::InvalidCount {
            value: value.to_string(),
        }),
    }
}

/// Like [`parse_count`] but truncates toward zero and rejects negatives.
pub fn parse_whole_count(value: &str) -> Result<u64, ReconcileError> {
    let n = parse_count(value)?;
    if n < 0.0 {
        return Err(ReconcileError::InvalidCount {
            value: value.to_string(),
        });
    }
    Ok(n.trunc() as u64)
}
