use quick_xml::Reader;
use quick_xml::events::Event;

use super::archive::{Package, attr, read_properties, render_rows, text_of};
use super::{ConvertError, ConvertedDocument, DocElement, ElementLabel, InputFormat};

pub(super) fn convert(bytes: &[u8]) -> Result<ConvertedDocument, ConvertError> {
    let mut pkg = Package::open(bytes)?;
    let body = pkg.read_string("word/document.xml")?;
    let properties = match pkg.read_optional("docProps/core.xml")? {
        Some(xml) => read_properties(&xml).unwrap_or_else(|e| {
            tracing::debug!("ignoring unreadable core properties: {e}");
            Default::default()
        }),
        None => Default::default(),
    };

    let mut elements = Vec::new();
    let walk = walk_body(&body, &mut elements);
    Ok(ConvertedDocument::from_walk(
        InputFormat::Docx,
        properties,
        elements,
        walk,
    ))
}

fn style_label(style: Option<&str>, numbered: bool) -> ElementLabel {
    let style = style.map(str::to_ascii_lowercase).unwrap_or_default();
    if style == "title" {
        ElementLabel::Title
    } else if style.starts_with("heading") {
        ElementLabel::SectionHeader
    } else if style == "caption" {
        ElementLabel::Caption
    } else if numbered || style.starts_with("list") {
        ElementLabel::ListItem
    } else {
        ElementLabel::Paragraph
    }
}

#[derive(Default)]
struct Table {
    depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

/// Walk `w:body`: paragraphs become labeled elements, top-level tables
/// become one table element each.
fn walk_body(xml: &str, out: &mut Vec<DocElement>) -> Result<(), ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraph = String::new();
    let mut style: Option<String> = None;
    let mut numbered = false;
    let mut in_text = false;
    let mut table = Table::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" if table.depth == 0 => {
                    paragraph.clear();
                    style = None;
                    numbered = false;
                }
                b"pStyle" => style = attr(&e, b"val"),
                b"numPr" => numbered = true,
                b"t" => in_text = true,
                b"tbl" => {
                    table.depth += 1;
                    if table.depth == 1 {
                        table.rows.clear();
                    }
                }
                b"tr" if table.depth == 1 => table.row.clear(),
                b"tc" if table.depth == 1 => table.cell.clear(),
                _ => {}
            },
            Event::Empty(e) => {
                let target = if table.depth > 0 {
                    &mut table.cell
                } else {
                    &mut paragraph
                };
                match e.local_name().as_ref() {
                    b"pStyle" => style = attr(&e, b"val"),
                    b"numPr" => numbered = true,
                    b"tab" => target.push('\t'),
                    b"br" | b"cr" => target.push('\n'),
                    _ => {}
                }
            }
            Event::Text(e) if in_text => {
                let text = text_of(&e)?;
                if table.depth > 0 {
                    table.cell.push_str(&text);
                } else {
                    paragraph.push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if table.depth > 0 => {
                    if !table.cell.is_empty() && !table.cell.ends_with(' ') {
                        table.cell.push(' ');
                    }
                }
                b"p" => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        out.push(DocElement::new(
                            style_label(style.as_deref(), numbered),
                            text,
                        ));
                    }
                }
                b"tc" if table.depth == 1 => {
                    let cell = table.cell.trim().to_owned();
                    table.row.push(cell);
                }
                b"tr" if table.depth == 1 => {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
                b"tbl" => {
                    table.depth = table.depth.saturating_sub(1);
                    if table.depth == 0 {
                        let text = render_rows(&table.rows);
                        if !text.is_empty() {
                            out.push(DocElement::new(ElementLabel::Table, text));
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}
