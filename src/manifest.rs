use std::{
    fs::File,
    path::{Component, Path},
};

use data_model::{ManifestRow, MANIFEST_FILE_NAME_COLUMN, MANIFEST_HEADER, MANIFEST_TYPE_COLUMN};

use crate::error::TransferError;

pub const MANIFEST_DELIMITER: u8 = b',';

fn format_error(path: &Path, reason: impl Into<String>) -> TransferError {
    TransferError::ManifestFormat {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn open(path: &Path) -> Result<csv::Reader<File>, TransferError> {
    csv::ReaderBuilder::new()
        .delimiter(MANIFEST_DELIMITER)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format_error(path, format!("probably not a valid csv: {e}")))
}

fn check_header<R: std::io::Read>(
    path: &Path,
    reader: &mut csv::Reader<R>,
    expected: &[&str],
) -> Result<(), TransferError> {
    let header = reader
        .headers()
        .map_err(|e| format_error(path, format!("probably not a valid csv: {e}")))?;
    if !header.iter().eq(expected.iter().copied()) {
        return Err(format_error(
            path,
            format!(
                "header {:?} does not match expected {:?}",
                header.iter().collect::<Vec<_>>(),
                expected
            ),
        ));
    }
    Ok(())
}

/// A feed file name must name an entry directly inside the source directory.
fn is_plain_file_name(file_name: &str) -> bool {
    let mut components = Path::new(file_name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Checks only that `path` is a delimited table whose header equals
/// `expected`.
pub fn validate_header(path: &Path, expected: &[&str]) -> Result<(), TransferError> {
    let mut reader = open(path)?;
    check_header(path, &mut reader, expected)
}

/// Reads every row of a manifest. Nothing is returned unless the whole file
/// parses and the header matches [`MANIFEST_HEADER`] exactly.
pub fn read(path: &Path) -> Result<Vec<ManifestRow>, TransferError> {
    let mut reader = open(path)?;
    check_header(path, &mut reader, &MANIFEST_HEADER)?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format_error(path, format!("row {}: {e}", index + 1)))?;
        let (Some(category), Some(file_name)) = (
            record.get(MANIFEST_TYPE_COLUMN),
            record.get(MANIFEST_FILE_NAME_COLUMN),
        ) else {
            return Err(format_error(
                path,
                format!("row {} has {} columns", index + 1, record.len()),
            ));
        };
        if !is_plain_file_name(file_name) {
            return Err(format_error(
                path,
                format!("row {} names {file_name:?}, not a plain file name", index + 1),
            ));
        }
        rows.push(ManifestRow::new(category, file_name));
    }
    Ok(rows)
}
