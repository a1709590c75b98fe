//! Sheet resolution and metadata row extraction.
//!
//! Each person's spreadsheet has one sheet per classification group. Codes
//! under roots 4 and 9 pick a two-level sheet (`"四-1"`), every other root a
//! single-numeral sheet (`"七"`).
//!
//! # Sheet layout
//!
//! | Column | Content |
//! |--------|---------|
//! | A | classification code of the row |
//! | B | material name |
//! | C / D / E | year / month / day, each optional |
//! | F | page count |
//!
//! Data starts at row 5, or row 6 under roots 4 and 9 which carry an extra
//! header row. A run of [`MAX_BLANK_RUN`] fully blank rows ends the table.

use std::collections::BTreeMap;

use crate::models::MetadataRow;
use crate::naming::normalize_code;

/// Consecutive fully blank rows that end a table.
pub const MAX_BLANK_RUN: usize = 7;

const SHEET_TABLE: [(&str, &str); 16] = [
    ("1", "一"),
    ("2", "二"),
    ("3", "三"),
    ("4-1", "四-1"),
    ("4-2", "四-2"),
    ("4-3", "四-3"),
    ("4-4", "四-4"),
    ("5", "五"),
    ("6", "六"),
    ("7", "七"),
    ("8", "八"),
    ("9-1", "九-1"),
    ("9-2", "九-2"),
    ("9-3", "九-3"),
    ("9-4", "九-4"),
    ("10", "十"),
];

const COL_CODE: usize = 0;
const COL_NAME: usize = 1;
const COL_DATE: [usize; 3] = [2, 3, 4];
const COL_PAGES: usize = 5;

fn main_part(code: &str) -> &str {
    code.split('-').next().unwrap_or("").trim()
}

fn has_two_level_sheets(main: &str) -> bool {
    main == "4" || main == "9"
}

/// Reduce a classification code to the key that selects its sheet.
pub fn sheet_key(code: &str) -> String {
    let parts: Vec<&str> = code.split('-').map(str::trim).collect();
    let main = parts[0];
    match parts.get(1) {
        Some(sub) if has_two_level_sheets(main) => format!("{}-{}", main, sub),
        _ => main.to_string(),
    }
}

/// Sheet name holding metadata for `code`, or `None` for unknown keys.
pub fn resolve_sheet(code: &str) -> Option<&'static str> {
    let key = sheet_key(code);
    SHEET_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, sheet)| *sheet)
}

/// All sheet names in code order.
pub fn known_sheets() -> impl Iterator<Item = &'static str> {
    SHEET_TABLE.iter().map(|(_, sheet)| *sheet)
}

/// First data row (1-based) for the sheet that holds `code`.
pub fn data_start_row(code: &str) -> u32 {
    if has_two_level_sheets(main_part(code)) {
        6
    } else {
        5
    }
}

/// First data row for a sheet addressed by name rather than by code.
pub fn data_start_row_for_sheet(sheet: &str) -> u32 {
    if sheet.starts_with('四') || sheet.starts_with('九') {
        6
    } else {
        5
    }
}

/// A decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed display string. Integral numbers print without decimals.
    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    /// Display as an integer, truncating fractions. Text that does not parse
    /// as a number is kept verbatim.
    pub fn integer_display(&self) -> String {
        match self {
            CellValue::Number(n) if n.is_finite() => (n.trunc() as i64).to_string(),
            CellValue::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => (n.trunc() as i64).to_string(),
                _ => s.trim().to_string(),
            },
            CellValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            other => other.display(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Sparse cell grid of one sheet. Rows are 1-based, columns 0-based.
#[derive(Debug, Clone, Default)]
pub struct SheetGrid {
    rows: BTreeMap<u32, Vec<Option<CellValue>>>,
}

impl SheetGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, row: u32, col: usize, value: CellValue) {
        let cells = self.rows.entry(row).or_default();
        if cells.len() <= col {
            cells.resize(col + 1, None);
        }
        cells[col] = Some(value);
    }

    pub fn cell(&self, row: u32, col: usize) -> Option<&CellValue> {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get(col))
            .and_then(Option::as_ref)
    }

    /// Last row that holds any cell, 0 for an empty sheet.
    pub fn max_row(&self) -> u32 {
        self.rows.keys().next_back().copied().unwrap_or(0)
    }

    fn row_is_blank(&self, row: u32) -> bool {
        match self.rows.get(&row) {
            Some(cells) => cells.iter().flatten().all(CellValue::is_blank),
            None => true,
        }
    }

    fn text(&self, row: u32, col: usize) -> String {
        self.cell(row, col).map(CellValue::display).unwrap_or_default()
    }

    fn integer(&self, row: u32, col: usize) -> Option<String> {
        self.cell(row, col)
            .filter(|c| !c.is_blank())
            .map(CellValue::integer_display)
    }
}

/// Read the metadata table starting at `start_row`.
///
/// Stops at the end of the sheet or after [`MAX_BLANK_RUN`] consecutive
/// blank rows; nothing past that run is examined.
pub fn extract_rows(grid: &SheetGrid, start_row: u32) -> Vec<MetadataRow> {
    let mut rows = Vec::new();
    let mut blank_run = 0usize;

    for r in start_row..=grid.max_row() {
        if grid.row_is_blank(r) {
            blank_run += 1;
            if blank_run >= MAX_BLANK_RUN {
                break;
            }
            continue;
        }
        blank_run = 0;

        let date = COL_DATE
            .iter()
            .filter_map(|&c| grid.integer(r, c))
            .collect::<Vec<_>>()
            .join("-");

        rows.push(MetadataRow {
            classification_code: grid.text(r, COL_CODE),
            material_name: grid.text(r, COL_NAME),
            date,
            page_count: grid.integer(r, COL_PAGES).unwrap_or_else(|| "0".to_string()),
        });
    }

    rows
}

/// Row for `code`: exact match on column A first, then a match on the
/// normalized digit-group form. First match wins.
pub fn find_row<'a>(rows: &'a [MetadataRow], code: &str) -> Option<&'a MetadataRow> {
    let code = code.trim();
    if let Some(row) = rows.iter().find(|r| r.classification_code == code) {
        return Some(row);
    }
    let wanted = normalize_code(code);
    if wanted.is_empty() {
        return None;
    }
    rows.iter()
        .find(|r| normalize_code(&r.classification_code) == wanted)
}
