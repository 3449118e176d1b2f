use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};

use super::archive::render_rows;
use super::{ConvertError, ConvertedDocument, DocElement, DocumentProperties, ElementLabel, InputFormat};

/// One table element per non-empty sheet; the sheet's position is its page.
pub(super) fn convert(bytes: &[u8], format: InputFormat) -> Result<ConvertedDocument, ConvertError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ConvertError::Spreadsheet(e.to_string()))?;

    let mut elements = Vec::new();
    let mut walk = Ok(());
    for (idx, name) in workbook.sheet_names().into_iter().enumerate() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                walk = Err(ConvertError::Spreadsheet(format!("sheet {name}: {e}")));
                break;
            }
        };
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        if let Some(text) = sheet_text(&name, &rows) {
            let page = u32::try_from(idx + 1).ok();
            elements.push(DocElement::new(ElementLabel::Table, text).on_page(page));
        }
    }

    Ok(ConvertedDocument::from_walk(
        format,
        DocumentProperties::default(),
        elements,
        walk,
    ))
}

pub(super) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_owned(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::Error(e) => e.to_string(),
    }
}

/// `Sheet: name` followed by the non-empty rows; `None` for an empty sheet.
pub(super) fn sheet_text(name: &str, rows: &[Vec<String>]) -> Option<String> {
    let body = render_rows(rows);
    if body.is_empty() {
        return None;
    }
    Some(format!("Sheet: {name}\n{body}"))
}
