use std::io::Cursor;

use calamine::{Data, DataType, Range, Reader, Xls, Xlsx};

use crate::error::{AppError, AppResult};

use super::values::format_number;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SheetFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) {
            SheetFormat::Xlsx
        } else if bytes.starts_with(OLE_MAGIC) {
            SheetFormat::Xls
        } else {
            SheetFormat::Csv
        }
    }
}

/// First worksheet as trimmed text cells.
#[derive(Debug, Default)]
pub struct Sheet {
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }
}

pub fn read_sheet(bytes: &[u8]) -> AppResult<Sheet> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }

    let format = SheetFormat::detect(bytes);
    tracing::debug!(?format, size = bytes.len(), "Reading spreadsheet");

    match format {
        SheetFormat::Xlsx => {
            let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
                .map_err(|e| AppError::BadRequest(format!("Failed to open Excel file: {e}")))?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| AppError::BadRequest("No worksheet found".into()))?
                .map_err(|e| AppError::BadRequest(format!("Failed to read Excel range: {e}")))?;
            Ok(range_to_sheet(&range))
        }
        SheetFormat::Xls => {
            let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes))
                .map_err(|e| AppError::BadRequest(format!("Failed to open Excel file: {e}")))?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| AppError::BadRequest("No worksheet found".into()))?
                .map_err(|e| AppError::BadRequest(format!("Failed to read Excel range: {e}")))?;
            Ok(range_to_sheet(&range))
        }
        SheetFormat::Csv => read_csv(bytes),
    }
}

fn range_to_sheet(range: &Range<Data>) -> Sheet {
    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    Sheet { rows }
}

pub(crate) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        // Excel dates are serial day numbers
        other => other
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| other.to_string()),
    }
}

fn read_csv(bytes: &[u8]) -> AppResult<Sheet> {
    // a UTF-8 BOM would otherwise stick to the first header
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            AppError::BadRequest(format!("Invalid CSV at line {}: {e}", index + 1))
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Sheet { rows })
}
