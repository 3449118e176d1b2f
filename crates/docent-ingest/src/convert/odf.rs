use quick_xml::Reader;
use quick_xml::events::Event;

use super::archive::{Package, attr, read_properties, render_rows, text_of};
use super::{ConvertError, ConvertedDocument, DocElement, ElementLabel, InputFormat};

/// OpenDocument text and presentation files (`content.xml` + `meta.xml`).
pub(super) fn convert(bytes: &[u8], format: InputFormat) -> Result<ConvertedDocument, ConvertError> {
    let mut pkg = Package::open(bytes)?;
    let content = pkg.read_string("content.xml")?;
    let properties = match pkg.read_optional("meta.xml")? {
        Some(xml) => read_properties(&xml).unwrap_or_default(),
        None => Default::default(),
    };

    let mut elements = Vec::new();
    let walk = walk_content(&content, &mut elements);
    Ok(ConvertedDocument::from_walk(format, properties, elements, walk))
}

/// An open `text:p` or `text:h`; notes nest paragraphs inside paragraphs.
struct Block {
    label: ElementLabel,
    text: String,
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    list_depth: usize,
    note_depth: usize,
    title_frame: bool,
    page: Option<u32>,
    pages: u32,
    table_depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

impl Walker {
    fn open_block(&mut self, heading: bool) {
        let label = if self.note_depth > 0 {
            ElementLabel::Footnote
        } else if heading {
            ElementLabel::SectionHeader
        } else if self.title_frame {
            ElementLabel::Title
        } else if self.list_depth > 0 {
            ElementLabel::ListItem
        } else {
            ElementLabel::Paragraph
        };
        self.blocks.push(Block {
            label,
            text: String::new(),
        });
    }

    fn close_block(&mut self, out: &mut Vec<DocElement>) {
        let Some(block) = self.blocks.pop() else {
            return;
        };
        let text = block.text.trim();
        if text.is_empty() {
            return;
        }
        if self.table_depth > 0 && block.label != ElementLabel::Footnote {
            if !self.cell.is_empty() {
                self.cell.push(' ');
            }
            self.cell.push_str(text);
            return;
        }
        out.push(DocElement::new(block.label, text).on_page(self.page));
    }

    fn push_text(&mut self, text: &str) {
        if let Some(block) = self.blocks.last_mut() {
            block.text.push_str(text);
        }
    }
}

fn walk_content(xml: &str, out: &mut Vec<DocElement>) -> Result<(), ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut w = Walker::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => w.open_block(false),
                b"h" => w.open_block(true),
                b"list-item" => w.list_depth += 1,
                b"note-body" => w.note_depth += 1,
                b"page" => {
                    w.pages += 1;
                    w.page = Some(w.pages);
                }
                b"frame" => {
                    w.title_frame = attr(&e, b"class").as_deref() == Some("title");
                }
                b"table" => {
                    w.table_depth += 1;
                    if w.table_depth == 1 {
                        w.rows.clear();
                    }
                }
                b"table-row" if w.table_depth == 1 => w.row.clear(),
                b"table-cell" if w.table_depth == 1 => w.cell.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"s" => {
                    let count = attr(&e, b"c")
                        .and_then(|c| c.parse::<usize>().ok())
                        .unwrap_or(1);
                    w.push_text(&" ".repeat(count));
                }
                b"tab" => w.push_text("\t"),
                b"line-break" => w.push_text("\n"),
                b"table-cell" if w.table_depth == 1 => w.row.push(String::new()),
                _ => {}
            },
            Event::Text(e) => {
                if !w.blocks.is_empty() {
                    w.push_text(&text_of(&e)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" | b"h" => w.close_block(out),
                b"list-item" => w.list_depth = w.list_depth.saturating_sub(1),
                b"note-body" => w.note_depth = w.note_depth.saturating_sub(1),
                b"page" => w.page = None,
                b"frame" => w.title_frame = false,
                b"table-cell" if w.table_depth == 1 => {
                    let cell = w.cell.trim().to_owned();
                    w.row.push(cell);
                }
                b"table-row" if w.table_depth == 1 => {
                    let row = std::mem::take(&mut w.row);
                    w.rows.push(row);
                }
                b"table" => {
                    w.table_depth = w.table_depth.saturating_sub(1);
                    if w.table_depth == 0 {
                        let text = render_rows(&w.rows);
                        if !text.is_empty() {
                            out.push(DocElement::new(ElementLabel::Table, text).on_page(w.page));
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

#[cfg(test)]
mod tests {
    use super::super::archive::fixtures::zip_bytes;
    use super::*;

    const TEXT_CONTENT: &str = r#"<office:document-content><office:body><office:text>
<text:h text:outline-level="1">Introduction</text:h>
<text:p>First<text:s text:c="2"/>paragraph<text:note><text:note-citation>1</text:note-citation><text:note-body><text:p>A footnote here.</text:p></text:note-body></text:note> continues.</text:p>
<text:list><text:list-item><text:p>Item one</text:p></text:list-item><text:list-item><text:p>Item two</text:p></text:list-item></text:list>
<table:table><table:table-row><table:table-cell><text:p>a</text:p></table:table-cell><table:table-cell/><table:table-cell><text:p>c</text:p></table:table-cell></table:table-row></table:table>
<text:p/>
</office:text></office:body></office:document-content>"#;

    #[test]
    fn text_document_elements() {
        let mut out = Vec::new();
        walk_content(TEXT_CONTENT, &mut out).unwrap();
        let labels: Vec<_> = out.iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            [
                ElementLabel::SectionHeader,
                ElementLabel::Footnote,
                ElementLabel::Paragraph,
                ElementLabel::ListItem,
                ElementLabel::ListItem,
                ElementLabel::Table,
            ]
        );
        assert_eq!(out[1].text, "A footnote here.");
        assert_eq!(out[2].text, "First  paragraph1 continues.");
        assert_eq!(out[5].text, "a |  | c");
        assert!(out.iter().all(|e| e.page.is_none()));
    }

    #[test]
    fn presentation_pages_and_titles() {
        let xml = r#"<office:document-content><office:body><office:presentation>
<draw:page draw:name="one"><draw:frame presentation:class="title"><draw:text-box><text:p>Welcome</text:p></draw:text-box></draw:frame>
<draw:frame presentation:class="outline"><draw:text-box><text:p>Agenda item</text:p></draw:text-box></draw:frame></draw:page>
<draw:page draw:name="two"><draw:frame><draw:text-box><text:p>Second slide</text:p></draw:text-box></draw:frame></draw:page>
</office:presentation></office:body></office:document-content>"#;
        let mut out = Vec::new();
        walk_content(xml, &mut out).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].label, ElementLabel::Title);
        assert_eq!(out[0].page, Some(1));
        assert_eq!(out[1].label, ElementLabel::Paragraph);
        assert_eq!(out[2].page, Some(2));
    }

    #[test]
    fn package_reads_meta() {
        let meta = "<office:document-meta><office:meta><dc:title>Minutes</dc:title><meta:initial-creator>Ada</meta:initial-creator></office:meta></office:document-meta>";
        let bytes = zip_bytes(&[
            ("mimetype", "application/vnd.oasis.opendocument.text"),
            ("content.xml", TEXT_CONTENT),
            ("meta.xml", meta),
        ]);
        let doc = convert(&bytes, InputFormat::Odt).unwrap();
        assert_eq!(doc.format, InputFormat::Odt);
        assert_eq!(doc.properties.title.as_deref(), Some("Minutes"));
        assert_eq!(doc.properties.authors, ["Ada"]);
        assert_eq!(doc.total_elements(), 6);
    }
}
