//! Minimal `.xlsx` reader producing [`SheetGrid`]s.
//!
//! Reads only what metadata lookup needs: the sheet list (by name, through
//! `xl/workbook.xml` and its relationships), the shared string table, and
//! the cell values of one sheet at a time. Styles, formulas and merged cells
//! are ignored; a formula cell contributes its cached value.
//!
//! Every ZIP entry is read through a size cap (zip-bomb protection), and a
//! sheet stops decoding after [`MAX_CELLS_PER_SHEET`] cells.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use dossier_core::sheet::{CellValue, SheetGrid};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Cells decoded per sheet before the rest is ignored.
pub const MAX_CELLS_PER_SHEET: usize = 100_000;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("not a valid xlsx archive: {0}")]
    Zip(String),
    #[error("malformed workbook XML in {part}: {message}")]
    Xml { part: String, message: String },
    #[error("ZIP entry {0} exceeds size limit")]
    TooLarge(String),
    #[error("workbook has no sheets")]
    NoSheets,
}

/// A sheet as listed by the workbook, in tab order.
#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    part: String,
}

/// An opened workbook over in-memory bytes.
pub struct Workbook<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
}

impl<'a> Workbook<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, XlsxError> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| XlsxError::Zip(e.to_string()))?;

        let sheets = match list_sheets(&mut archive)? {
            sheets if !sheets.is_empty() => sheets,
            _ => list_worksheet_parts(&archive),
        };
        if sheets.is_empty() {
            return Err(XlsxError::NoSheets);
        }

        let shared_strings = if archive.index_for_name(SHARED_STRINGS_PART).is_some() {
            let xml = read_entry_bounded(&mut archive, SHARED_STRINGS_PART)?;
            parse_shared_strings(&xml)?
        } else {
            Vec::new()
        };

        Ok(Self {
            archive,
            sheets,
            shared_strings,
        })
    }

    /// Sheet names in tab order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Decode the sheet with this exact name, or `None` when absent.
    pub fn read_sheet(&mut self, name: &str) -> Result<Option<SheetGrid>, XlsxError> {
        match self.sheets.iter().position(|s| s.name == name) {
            Some(index) => self.read_sheet_at(index).map(Some),
            None => Ok(None),
        }
    }

    /// Decode the first sheet in tab order.
    pub fn read_first_sheet(&mut self) -> Result<SheetGrid, XlsxError> {
        self.read_sheet_at(0)
    }

    fn read_sheet_at(&mut self, index: usize) -> Result<SheetGrid, XlsxError> {
        let part = match self.sheets.get(index) {
            Some(entry) => entry.part.clone(),
            None => return Err(XlsxError::NoSheets),
        };
        let xml = read_entry_bounded(&mut self.archive, &part)?;
        parse_sheet(&xml, &self.shared_strings, &part)
    }
}

fn read_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, XlsxError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| XlsxError::Zip(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| XlsxError::Zip(format!("{}: {}", name, e)))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(XlsxError::TooLarge(name.to_string()));
    }
    Ok(out)
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> XlsxError {
    XlsxError::Xml {
        part: part.to_string(),
        message: e.to_string(),
    }
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Sheets named in `xl/workbook.xml`, resolved to their parts through the
/// workbook relationships. Empty when the workbook part is absent.
fn list_sheets(archive: &mut zip::ZipArchive<Cursor<&[u8]>>) -> Result<Vec<SheetEntry>, XlsxError> {
    if archive.index_for_name(WORKBOOK_PART).is_none() {
        return Ok(Vec::new());
    }

    let rels = if archive.index_for_name(WORKBOOK_RELS_PART).is_some() {
        let xml = read_entry_bounded(archive, WORKBOOK_RELS_PART)?;
        parse_relationships(&xml)?
    } else {
        HashMap::new()
    };

    let xml = read_entry_bounded(archive, WORKBOOK_PART)?;
    let mut reader = Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut position = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                position += 1;
                if let Some(name) = attr(&e, b"name") {
                    let part = attr(&e, b"id")
                        .and_then(|rid| rels.get(&rid).cloned())
                        .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position));
                    sheets.push(SheetEntry { name, part });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Relationship id to absolute part name.
fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut rels = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    let part = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    };
                    rels.insert(id, part);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_RELS_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Fallback for workbooks without `xl/workbook.xml`: every worksheet part,
/// named after its file stem.
fn list_worksheet_parts(archive: &zip::ZipArchive<Cursor<&[u8]>>) -> Vec<SheetEntry> {
    let mut parts: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    parts.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    parts
        .into_iter()
        .map(|part| SheetEntry {
            name: part
                .trim_start_matches("xl/worksheets/")
                .trim_end_matches(".xml")
                .to_string(),
            part,
        })
        .collect()
}

/// One string per `<si>`, rich-text runs concatenated, phonetic runs skipped.
fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(te)) if in_t && !in_phonetic => {
                if let Some(s) = current.as_mut() {
                    let text = te.unescape().map_err(|e| xml_error(SHARED_STRINGS_PART, e))?;
                    s.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(SHARED_STRINGS_PART, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Split an A1-style reference into a 1-based row and a 0-based column.
pub fn parse_cell_ref(reference: &str) -> Option<(u32, usize)> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let digits = &reference[letters.len()..];
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let col = letters.chars().fold(0usize, |acc, c| {
        acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1)
    });
    let row = digits.parse::<u32>().ok().filter(|r| *r > 0)?;
    Some((row, col - 1))
}

#[derive(Default)]
struct PendingCell {
    kind: Option<String>,
    value: String,
    inline: String,
}

impl PendingCell {
    fn into_value(self, shared: &[String]) -> Option<CellValue> {
        match self.kind.as_deref() {
            Some("s") => {
                let index = self.value.trim().parse::<usize>().ok()?;
                shared.get(index).cloned().map(CellValue::Text)
            }
            Some("inlineStr") => Some(CellValue::Text(self.inline)),
            Some("b") => Some(CellValue::Bool(self.value.trim() == "1")),
            Some("str") | Some("e") | Some("d") => Some(CellValue::Text(self.value)),
            _ => {
                let raw = self.value.trim();
                if raw.is_empty() {
                    return None;
                }
                Some(match raw.parse::<f64>() {
                    Ok(n) => CellValue::Number(n),
                    Err(_) => CellValue::Text(raw.to_string()),
                })
            }
        }
    }
}

fn parse_sheet(xml: &[u8], shared: &[String], part: &str) -> Result<SheetGrid, XlsxError> {
    let mut grid = SheetGrid::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row: u32 = 0;
    let mut col: usize = 0;
    let mut cell: Option<PendingCell> = None;
    let mut in_v = false;
    let mut in_inline_t = false;
    let mut cells = 0usize;

    loop {
        if cells >= MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = attr(&e, b"r")
                        .and_then(|r| r.parse::<u32>().ok())
                        .unwrap_or(row + 1);
                    col = 0;
                }
                b"c" => {
                    if let Some((r, c)) = attr(&e, b"r").as_deref().and_then(parse_cell_ref) {
                        row = r;
                        col = c;
                    }
                    cell = Some(PendingCell {
                        kind: attr(&e, b"t"),
                        ..PendingCell::default()
                    });
                }
                b"v" => in_v = true,
                b"t" if cell.is_some() => in_inline_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = attr(&e, b"r")
                        .and_then(|r| r.parse::<u32>().ok())
                        .unwrap_or(row + 1);
                }
                b"c" => {
                    if let Some((r, c)) = attr(&e, b"r").as_deref().and_then(parse_cell_ref) {
                        row = r;
                        col = c;
                    }
                    col += 1;
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_v || in_inline_t => {
                let text = te.unescape().map_err(|e| xml_error(part, e))?;
                if let Some(pending) = cell.as_mut() {
                    if in_v {
                        pending.value.push_str(&text);
                    } else {
                        pending.inline.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                b"c" => {
                    if let Some(value) = cell.take().and_then(|c| c.into_value(shared)) {
                        if row > 0 {
                            grid.set(row, col, value);
                            cells += 1;
                        }
                    }
                    col += 1;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(grid)
}
