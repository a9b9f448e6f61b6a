//! Tabular file reading: CSV (UTF-8) and spreadsheets (first sheet).
//!
//! Reading is DETERMINISTIC: same bytes = same rows, same row numbers.
//! The first row is always the header, so the first data row is row 2.

use std::fmt;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{IngestError, Result};
use crate::normalize::ColumnMap;

/// Row number of the first data row (the header is row 1).
pub const FIRST_DATA_ROW: usize = 2;

/// Supported upload formats, detected from the filename extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    pub fn from_filename(filename: &str) -> Result<Self> {
        let lower = filename.trim().to_lowercase();
        if lower.ends_with(".csv") {
            Ok(FileFormat::Csv)
        } else if lower.ends_with(".xls") || lower.ends_with(".xlsx") {
            Ok(FileFormat::Spreadsheet)
        } else {
            Err(IngestError::UnsupportedFormat(filename.to_string()))
        }
    }
}

/// An untyped cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    /// Blank cells and whitespace-only text count as absent.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Trimmed textual form; empty for blank cells.
    pub fn as_text(&self) -> String {
        if self.is_blank() {
            return String::new();
        }
        self.to_string().trim().to_string()
    }

    fn from_csv_field(field: &str) -> Self {
        if field.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(field.to_string())
        }
    }

    fn from_sheet_cell(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(s) if s.trim().is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Int(*i),
            Data::Float(f) => CellValue::Float(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Int(i) => write!(f, "{}", i),
            // Excel stores every number as a float; a code typed as 1001 must
            // not come back as "1001.0".
            CellValue::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
                write!(f, "{:.0}", v)
            }
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Empty => serializer.serialize_none(),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Int(i) => serializer.serialize_i64(*i),
            CellValue::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            CellValue::Float(_) => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

/// One data record: ordered (column, value) pairs plus its row number.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub number: usize,
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new(number: usize, cells: Vec<(String, CellValue)>) -> Self {
        Self { number, cells }
    }

    /// First cell stored under `column`.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Trimmed text of a column; empty when absent or blank.
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(CellValue::as_text).unwrap_or_default()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_blank())
    }

    /// Rename columns through the entity's column map.
    pub fn normalized(self, map: &ColumnMap) -> RawRow {
        RawRow {
            number: self.number,
            cells: self
                .cells
                .into_iter()
                .map(|(name, value)| (map.canonical(&name), value))
                .collect(),
        }
    }
}

/// Serializes as an ordered JSON object; blank cells become `null`.
impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A parsed file: raw headers and data rows keyed by raw header.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl Table {
    /// Apply the column map to every row.
    pub fn normalized(self, map: &ColumnMap) -> Vec<RawRow> {
        self.rows.into_iter().map(|row| row.normalized(map)).collect()
    }
}

/// Parse file bytes according to the filename extension.
pub fn read_table(content: &[u8], filename: &str) -> Result<Table> {
    match FileFormat::from_filename(filename)? {
        FileFormat::Csv => read_csv(content),
        FileFormat::Spreadsheet => read_spreadsheet(content),
    }
}

/// Parse UTF-8 CSV. A leading BOM is ignored; rows must all have the header's width.
pub fn read_csv(content: &[u8]) -> Result<Table> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    let text = encoding_rs::UTF_8
        .decode_without_bom_handling_and_without_replacement(content)
        .ok_or_else(|| IngestError::Malformed("CSV is not valid UTF-8".to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Malformed(format!("CSV header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (offset, result) in reader.records().enumerate() {
        let record = result.map_err(|e| IngestError::Malformed(format!("CSV: {}", e)))?;
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(header, field)| (header.clone(), CellValue::from_csv_field(field)))
            .collect();
        push_data_row(&mut rows, FIRST_DATA_ROW + offset, cells);
    }

    Ok(Table { headers, rows })
}

/// Parse the first worksheet of an XLS/XLSX workbook.
pub fn read_spreadsheet(content: &[u8]) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| IngestError::Malformed(format!("spreadsheet: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names
        .first()
        .ok_or_else(|| IngestError::Malformed("workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| IngestError::Malformed(format!("sheet '{}': {}", sheet_name, e)))?;

    // The range starts at the first non-empty row; numbers follow the sheet gutter.
    let first_data_row = range.start().map_or(0, |(row, _)| row as usize) + FIRST_DATA_ROW;
    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| match cell {
                Data::String(s) => s.trim().to_string(),
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect(),
        None => return Ok(Table::default()),
    };

    let mut rows = Vec::new();
    for (offset, sheet_row) in sheet_rows.enumerate() {
        let cells = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(idx, header)| {
                let value = sheet_row
                    .get(idx)
                    .map(CellValue::from_sheet_cell)
                    .unwrap_or(CellValue::Empty);
                (header.clone(), value)
            })
            .collect();
        push_data_row(&mut rows, first_data_row + offset, cells);
    }

    Ok(Table { headers, rows })
}

/// Blank records are dropped. `number` is the record's position in the file,
/// so a skipped record never shifts the rows after it.
fn push_data_row(rows: &mut Vec<RawRow>, number: usize, cells: Vec<(String, CellValue)>) {
    let row = RawRow::new(number, cells);
    if !row.is_blank() {
        rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_filename("a.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_filename("A.CSV").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_filename("b.xlsx").unwrap(), FileFormat::Spreadsheet);
        assert_eq!(FileFormat::from_filename("b.XLS").unwrap(), FileFormat::Spreadsheet);
    }

    #[test]
    fn test_unsupported_format_fails() {
        let err = read_table(b"a,b\n1,2\n", "data.txt").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_csv_row_numbers_start_at_two() {
        let table = read_csv(b"codigo,nombre\nA,Uno\nB,Dos\n").unwrap();
        assert_eq!(table.headers, vec!["codigo", "nombre"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].number, 2);
        assert_eq!(table.rows[1].number, 3);
        assert_eq!(table.rows[1].text("nombre"), "Dos");
    }

    #[test]
    fn test_csv_trims_and_marks_empty() {
        let table = read_csv(b"codigo,precio\n  A  ,\n").unwrap();
        assert_eq!(table.rows[0].text("codigo"), "A");
        assert_eq!(table.rows[0].get("precio"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_csv_with_bom() {
        let table = read_csv("\u{feff}codigo\nA\n".as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["codigo"]);
    }

    #[test]
    fn test_csv_header_only() {
        let table = read_csv(b"codigo,nombre\n").unwrap();
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_csv_skips_blank_records() {
        let table = read_csv(b"codigo,nombre\nA,Uno\n,\nB,Dos\n").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].text("codigo"), "B");
        assert_eq!(table.rows[1].number, 4);
    }

    #[test]
    fn test_csv_rows_after_blank_record_keep_their_line() {
        let table = read_csv(b"codigo,precio\nP1,10\n,\n,\nP2,-5\n").unwrap();
        let numbers: Vec<usize> = table.rows.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![2, 5]);
    }

    #[test]
    fn test_csv_ragged_row_fails() {
        let err = read_csv(b"codigo,nombre\nA,Uno,extra\n").unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
    }

    #[test]
    fn test_csv_invalid_utf8_fails() {
        let err = read_csv(b"codigo\n\xff\xfe\n").unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
    }

    #[test]
    fn test_garbage_spreadsheet_fails() {
        let err = read_table(b"definitely not a workbook", "x.xlsx").unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
    }

    const WORKBOOK: &[u8] = include_bytes!("../tests/fixtures/productos.xlsx");

    #[test]
    fn test_spreadsheet_reads_first_sheet_only() {
        let table = read_table(WORKBOOK, "productos.xlsx").unwrap();
        assert_eq!(table.headers[0], "CÓDIGO");
        assert!(table.rows.iter().all(|r| r.text("CÓDIGO") != "NO_LEER"));
    }

    #[test]
    fn test_spreadsheet_drops_unnamed_columns() {
        let table = read_table(WORKBOOK, "productos.xlsx").unwrap();
        let columns: Vec<&str> = table.rows[0].columns().collect();
        assert_eq!(columns, vec!["CÓDIGO", "NOMBRE", "CATEGORÍA", "PRECIO", "STOCK"]);
    }

    #[test]
    fn test_spreadsheet_rows_follow_sheet_gutter() {
        let table = read_table(WORKBOOK, "productos.xlsx").unwrap();
        let numbers: Vec<usize> = table.rows.iter().map(|r| r.number).collect();
        // Sheet row 3 is empty.
        assert_eq!(numbers, vec![2, 4, 5]);
        assert_eq!(table.rows[0].text("CÓDIGO"), "1001");
        assert_eq!(table.rows[2].get("PRECIO"), Some(&CellValue::Float(45.5)));
    }

    #[test]
    fn test_float_display_drops_zero_fraction() {
        assert_eq!(CellValue::Float(1001.0).to_string(), "1001");
        assert_eq!(CellValue::Float(15.5).to_string(), "15.5");
        assert_eq!(CellValue::Int(7).to_string(), "7");
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let row = RawRow::new(
            2,
            vec![
                ("zeta".to_string(), CellValue::Text("z".to_string())),
                ("alfa".to_string(), CellValue::Empty),
            ],
        );
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":"z","alfa":null}"#);
    }

    #[test]
    fn test_normalized_renames_columns() {
        let map = ColumnMap::new(&[("CÓDIGO", "codigo")]);
        let table = read_csv("CÓDIGO,Precio Unitario\nA,10\n".as_bytes()).unwrap();
        let rows = table.normalized(&map);
        assert_eq!(rows[0].text("codigo"), "A");
        assert_eq!(rows[0].text("precio_unitario"), "10");
    }
}
