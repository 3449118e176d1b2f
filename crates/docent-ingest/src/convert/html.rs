use scraper::{ElementRef, Html, Selector};

use super::{ConvertError, ConvertedDocument, DocElement, DocumentProperties, ElementLabel, InputFormat};

/// Never carry readable body text.
const SKIPPED: [&str; 8] = [
    "head", "script", "style", "noscript", "template", "svg", "iframe", "object",
];
/// Elements that end the current run of loose text.
const BREAKS: [&str; 28] = [
    "html", "body", "main", "div", "section", "article", "header", "footer", "nav", "aside",
    "ul", "ol", "dl", "dt", "dd", "form", "fieldset", "details", "summary", "address", "br",
    "hr", "tr", "td", "th", "caption", "figcaption", "center",
];

pub(super) fn convert(html: &str, format: InputFormat) -> ConvertedDocument {
    let document = Html::parse_document(html);
    let properties = properties(&document);
    let mut elements = Vec::new();
    let walk = walk_document(&document, None, &mut elements);
    ConvertedDocument::from_walk(format, properties, elements, walk)
}

fn selector(css: &str) -> Result<Selector, ConvertError> {
    Selector::parse(css).map_err(|e| ConvertError::Malformed(format!("selector {css}: {e}")))
}

fn properties(document: &Html) -> DocumentProperties {
    let first_text = |css: &str| {
        let sel = selector(css).ok()?;
        document
            .select(&sel)
            .next()
            .map(|el| normalize(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    };
    let meta = |name: &str| {
        let sel = selector(&format!("meta[name=\"{name}\"]")).ok()?;
        document
            .select(&sel)
            .find_map(|el| el.value().attr("content"))
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
    };
    DocumentProperties {
        title: first_text("title"),
        authors: meta("author").into_iter().collect(),
        created: meta("date").or_else(|| meta("dcterms.created")),
    }
}

/// Append the blocks of `document` in tree order, tagging them with `page`
/// (EPUB chapters pass their spine position). Text outside any recognized
/// block becomes a paragraph per run between breaking elements.
pub(super) fn walk_document(
    document: &Html,
    page: Option<u32>,
    out: &mut Vec<DocElement>,
) -> Result<(), ConvertError> {
    let mut walker = Walker {
        rows: selector("tr")?,
        cells: selector("th, td")?,
        captions: selector("figcaption")?,
        page,
        out,
        loose: String::new(),
    };
    walker.element(document.root_element());
    walker.flush();
    Ok(())
}

struct Walker<'a> {
    rows: Selector,
    cells: Selector,
    captions: Selector,
    page: Option<u32>,
    out: &'a mut Vec<DocElement>,
    loose: String,
}

impl Walker<'_> {
    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED.iter().any(|s| *s == name) {
            return;
        }
        if let Some((label, text)) = self.block(el) {
            self.flush();
            self.push(label, text);
            return;
        }
        let breaks = BREAKS.iter().any(|b| *b == name);
        if breaks {
            self.flush();
        }
        self.children(el);
        if breaks {
            self.flush();
        }
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                self.loose.push_str(text);
            } else if let Some(child) = ElementRef::wrap(child) {
                self.element(child);
            }
        }
    }

    /// Label and text of a recognized block; `None` for everything else.
    fn block(&self, el: ElementRef<'_>) -> Option<(ElementLabel, String)> {
        let block = match el.value().name() {
            "h1" => (ElementLabel::Title, normalize(&inner_text(el))),
            "h2" | "h3" | "h4" | "h5" | "h6" => {
                (ElementLabel::SectionHeader, normalize(&inner_text(el)))
            }
            "li" => (ElementLabel::ListItem, normalize(&inner_text(el))),
            "pre" => (ElementLabel::Code, inner_text(el).trim_matches('\n').to_owned()),
            "table" => (ElementLabel::Table, table_text(el, &self.rows, &self.cells)),
            "figure" => {
                let caption = el
                    .select(&self.captions)
                    .next()
                    .map(|c| normalize(&inner_text(c)));
                let text = caption.unwrap_or_else(|| normalize(&inner_text(el)));
                (ElementLabel::Figure, text)
            }
            "img" => {
                let alt = el.value().attr("alt").unwrap_or_default();
                (ElementLabel::Image, normalize(alt))
            }
            "p" | "blockquote" => (ElementLabel::Paragraph, normalize(&inner_text(el))),
            _ => return None,
        };
        Some(block)
    }

    fn flush(&mut self) {
        let text = normalize(&self.loose);
        self.loose.clear();
        self.push(ElementLabel::Paragraph, text);
    }

    fn push(&mut self, label: ElementLabel, text: String) {
        if !text.is_empty() {
            self.out.push(DocElement::new(label, text).on_page(self.page));
        }
    }
}

fn inner_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn table_text(table: ElementRef<'_>, rows: &Selector, cells: &Selector) -> String {
    table
        .select(rows)
        .map(|row| {
            row.select(cells)
                .map(|cell| normalize(&inner_text(cell)))
                .collect::<Vec<_>>()
        })
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title> Field Guide </title><meta name="author" content="Ada"></head>
<body>
<h1>Birds</h1>
<p>Birds are   warm-blooded
vertebrates.</p>
<h2>Habitat</h2>
<ul><li>Forests <p>nested</p></li><li>Wetlands</li></ul>
<table><tr><th>Name</th><th>Wingspan</th></tr><tr><td>Heron</td><td>1.8 m</td></tr></table>
<figure><img src="a.png" alt="ignored"><figcaption>A heron in flight</figcaption></figure>
<img src="b.png" alt="Nest photo">
<img src="c.png">
<pre>
fn main() {}
</pre>
<blockquote><p>Quoted words</p></blockquote>
</body></html>"#;

    #[test]
    fn blocks_in_document_order() {
        let doc = convert(PAGE, InputFormat::Html);
        let elements = doc.texts().unwrap();
        let labels: Vec<_> = elements.iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            [
                ElementLabel::Title,
                ElementLabel::Paragraph,
                ElementLabel::SectionHeader,
                ElementLabel::ListItem,
                ElementLabel::ListItem,
                ElementLabel::Table,
                ElementLabel::Figure,
                ElementLabel::Image,
                ElementLabel::Code,
                ElementLabel::Paragraph,
            ]
        );
        assert_eq!(elements[1].text, "Birds are warm-blooded vertebrates.");
        assert_eq!(elements[3].text, "Forests nested");
        assert_eq!(elements[5].text, "Name | Wingspan\nHeron | 1.8 m");
        assert_eq!(elements[6].text, "A heron in flight");
        assert_eq!(elements[7].text, "Nest photo");
        assert_eq!(elements[8].text, "fn main() {}");
        assert_eq!(elements[9].text, "Quoted words");
    }

    #[test]
    fn head_properties() {
        let doc = convert(PAGE, InputFormat::Html);
        assert_eq!(doc.properties.title.as_deref(), Some("Field Guide"));
        assert_eq!(doc.properties.authors, ["Ada"]);
        assert!(doc.properties.created.is_none());
    }

    #[test]
    fn page_tagging() {
        let mut out = Vec::new();
        let doc = Html::parse_document("<p>chapter text</p>");
        walk_document(&doc, Some(4), &mut out).unwrap();
        assert_eq!(out[0].page, Some(4));
    }

    #[test]
    fn loose_text_becomes_paragraphs() {
        let doc = convert(
            "<body>Intro line<div>The quarterly revenue grew.</div>\
             <section><div><span>Costs fell</span> <b>sharply</b> in March.</div></section>\
             <article>Tail <em>words</em><p>Inner paragraph</p>after</article>\
             <script>var hidden = 1;</script></body>",
            InputFormat::Html,
        );
        let texts: Vec<_> = doc.texts().unwrap().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            [
                "Intro line",
                "The quarterly revenue grew.",
                "Costs fell sharply in March.",
                "Tail words",
                "Inner paragraph",
                "after",
            ]
        );
        assert!(doc.export_to_text().contains("revenue"));
        assert!(!doc.export_to_text().contains("hidden"));
    }

    #[test]
    fn cells_outside_tables_are_kept() {
        let doc = convert("<div><td>stray cell</td>text</div>", InputFormat::Html);
        let texts: Vec<_> = doc.texts().unwrap().iter().map(|e| e.text.as_str()).collect();
        assert!(texts.iter().any(|t| t.contains("stray cell")));
        assert!(texts.iter().any(|t| t.contains("text")));
    }

    #[test]
    fn empty_document() {
        let doc = convert("", InputFormat::Html);
        assert_eq!(doc.total_elements(), 0);
        assert_eq!(doc.export_to_text(), "");
    }
}
