//! Reading the ISSN column out of uploaded CSV files and workbooks.

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};

use crate::error::{Error, Result, UploadError};

/// Header fragment identifying the identifier column (case-insensitive)
const COLUMN_HINT: &str = "issn";

/// ZIP local file header; every xlsx/ods container starts with it
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Legacy OLE compound document header (.xls)
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Uploaded file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Comma-separated text
    Csv,
    /// Excel or OpenDocument workbook
    Workbook,
}

/// Pick a parser by extension, falling back to the file's magic bytes
pub fn detect_format(filename: &str, bytes: &[u8]) -> SpreadsheetFormat {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("csv") | Some("txt") => SpreadsheetFormat::Csv,
        Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => {
            SpreadsheetFormat::Workbook
        }
        _ if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => {
            SpreadsheetFormat::Workbook
        }
        _ => SpreadsheetFormat::Csv,
    }
}

/// Raw, non-empty values of the first column whose header mentions ISSN
///
/// Only the first worksheet of a workbook is read. The first row is the header.
pub fn read_identifier_column(filename: &str, bytes: &[u8]) -> Result<Vec<String>> {
    let rows = match detect_format(filename, bytes) {
        SpreadsheetFormat::Csv => read_csv_rows(filename, bytes)?,
        SpreadsheetFormat::Workbook => read_workbook_rows(filename, bytes)?,
    };

    let mut rows = rows.into_iter();
    let header = rows.next().unwrap_or_default();
    let column = header
        .iter()
        .position(|h| h.to_lowercase().contains(COLUMN_HINT))
        .ok_or_else(|| {
            Error::Upload(UploadError::MissingIdentifierColumn {
                filename: filename.to_string(),
            })
        })?;

    tracing::debug!(
        filename,
        header = %header[column],
        "using identifier column"
    );

    Ok(rows
        .filter_map(|row| row.into_iter().nth(column))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}

fn read_csv_rows(filename: &str, bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| unreadable(filename, e))
        })
        .collect()
}

fn read_workbook_rows(filename: &str, bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| unreadable(filename, e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| unreadable(filename, "workbook has no worksheets"))?
        .map_err(|e| unreadable(filename, e))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

/// Render a workbook cell the way an operator typed it
///
/// Numeric ISSNs without a check letter come back from Excel as floats;
/// integral values are written without a fractional part.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn unreadable(filename: &str, reason: impl std::fmt::Display) -> Error {
    Error::Upload(UploadError::Unreadable {
        filename: filename.to_string(),
        reason: reason.to_string(),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_by_extension_then_magic() {
        assert_eq!(detect_format("a.CSV", b"PK\x03\x04"), SpreadsheetFormat::Csv);
        assert_eq!(detect_format("a.xlsx", b""), SpreadsheetFormat::Workbook);
        assert_eq!(detect_format("upload", b"PK\x03\x04rest"), SpreadsheetFormat::Workbook);
        assert_eq!(detect_format("upload", b"ISSN\n0142-6001"), SpreadsheetFormat::Csv);
    }

    #[test]
    fn reads_issn_column_from_csv() {
        let csv = "Title,Print ISSN,Publisher\n\
                   Journal A,0142-6001,Elsevier\n\
                   Journal B,,Wiley\n\
                   Journal C, 2049-3630 ,Springer\n";
        let values = read_identifier_column("journals.csv", csv.as_bytes()).unwrap();
        assert_eq!(values, vec!["0142-6001", "2049-3630"]);
    }

    #[test]
    fn header_match_is_case_insensitive_and_bom_tolerant() {
        let csv = "\u{feff}issn\n01426001\n";
        let values = read_identifier_column("list.csv", csv.as_bytes()).unwrap();
        assert_eq!(values, vec!["01426001"]);
    }

    #[test]
    fn short_rows_are_skipped() {
        let csv = "Name,ISSN\nonly-name\nB,2049-3630\n";
        let values = read_identifier_column("list.csv", csv.as_bytes()).unwrap();
        assert_eq!(values, vec!["2049-3630"]);
    }

    #[test]
    fn missing_column_is_reported() {
        let csv = "Title,Publisher\nA,B\n";
        let err = read_identifier_column("list.csv", csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            Error::Upload(UploadError::MissingIdentifierColumn { .. })
        ));
    }

    #[test]
    fn empty_file_is_missing_column() {
        let err = read_identifier_column("empty.csv", b"").unwrap_err();
        assert!(matches!(
            err,
            Error::Upload(UploadError::MissingIdentifierColumn { .. })
        ));
    }

    #[test]
    fn garbage_workbook_is_unreadable() {
        let err = read_identifier_column("broken.xlsx", b"not a zip").unwrap_err();
        assert!(matches!(err, Error::Upload(UploadError::Unreadable { .. })));
    }

    #[test]
    fn integral_floats_render_without_fraction() {
        assert_eq!(cell_to_string(&Data::Float(1426001.0)), "1426001");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_to_string(&Data::Int(20493630)), "20493630");
        assert_eq!(cell_to_string(&Data::String("0142-6001".into())), "0142-6001");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
