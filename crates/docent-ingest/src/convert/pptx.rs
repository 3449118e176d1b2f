use quick_xml::Reader;
use quick_xml::events::Event;

use super::archive::{Package, attr, read_properties, render_rows, text_of};
use super::{ConvertError, ConvertedDocument, DocElement, ElementLabel, InputFormat};

const SLIDE_PREFIX: &str = "ppt/slides/slide";

pub(super) fn convert(bytes: &[u8]) -> Result<ConvertedDocument, ConvertError> {
    let mut pkg = Package::open(bytes)?;
    let properties = match pkg.read_optional("docProps/core.xml")? {
        Some(xml) => read_properties(&xml).unwrap_or_default(),
        None => Default::default(),
    };

    let mut elements = Vec::new();
    let mut walk = Ok(());
    for (idx, name) in slide_names(&pkg.names()).into_iter().enumerate() {
        let page = u32::try_from(idx + 1).ok();
        let result = pkg
            .read_string(&name)
            .and_then(|xml| walk_slide(&xml, page, &mut elements));
        if let Err(e) = result {
            walk = Err(e);
            break;
        }
    }
    Ok(ConvertedDocument::from_walk(
        InputFormat::Pptx,
        properties,
        elements,
        walk,
    ))
}

/// Slide parts ordered by their number rather than lexically.
fn slide_names(names: &[String]) -> Vec<String> {
    let mut slides: Vec<(u32, String)> = names
        .iter()
        .filter_map(|name| {
            let number = name.strip_prefix(SLIDE_PREFIX)?.strip_suffix(".xml")?;
            Some((number.parse().ok()?, name.clone()))
        })
        .collect();
    slides.sort_unstable();
    slides.into_iter().map(|(_, name)| name).collect()
}

#[derive(Default)]
struct Shape {
    title: bool,
    paragraphs: Vec<String>,
}

/// Shapes yield a title or one paragraph element per text paragraph,
/// tables one table element, pictures an image element from their
/// description.
fn walk_slide(xml: &str, page: Option<u32>, out: &mut Vec<DocElement>) -> Result<(), ConvertError> {
    let mut reader = Reader::from_str(xml);
    let mut shape: Option<Shape> = None;
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut in_picture = false;
    let mut table: Option<Vec<Vec<String>>> = None;
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sp" => shape = Some(Shape::default()),
                b"pic" => in_picture = true,
                b"tbl" => table = Some(Vec::new()),
                b"tr" => row.clear(),
                b"tc" => cell.clear(),
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                b"cNvPr" if in_picture => push_description(&e, page, out),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"ph" => {
                    let kind = attr(&e, b"type");
                    if let Some(s) = shape.as_mut()
                        && matches!(kind.as_deref(), Some("title" | "ctrTitle"))
                    {
                        s.title = true;
                    }
                }
                b"br" => paragraph.push('\n'),
                b"cNvPr" if in_picture => push_description(&e, page, out),
                _ => {}
            },
            Event::Text(e) if in_text => paragraph.push_str(&text_of(&e)?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if table.is_some() {
                        if !cell.is_empty() {
                            cell.push(' ');
                        }
                        cell.push_str(text);
                    } else if let Some(s) = shape.as_mut() {
                        s.paragraphs.push(text.to_owned());
                    }
                }
                b"tc" => row.push(cell.trim().to_owned()),
                b"tr" => {
                    if let Some(rows) = table.as_mut() {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                b"tbl" => {
                    if let Some(rows) = table.take() {
                        let text = render_rows(&rows);
                        if !text.is_empty() {
                            out.push(DocElement::new(ElementLabel::Table, text).on_page(page));
                        }
                    }
                }
                b"sp" => {
                    if let Some(s) = shape.take() {
                        push_shape(s, page, out);
                    }
                }
                b"pic" => in_picture = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn push_shape(shape: Shape, page: Option<u32>, out: &mut Vec<DocElement>) {
    if shape.paragraphs.is_empty() {
        return;
    }
    if shape.title {
        let title = shape.paragraphs.join(" ");
        out.push(DocElement::new(ElementLabel::Title, title).on_page(page));
        return;
    }
    for text in shape.paragraphs {
        out.push(DocElement::new(ElementLabel::Paragraph, text).on_page(page));
    }
}

fn push_description(
    e: &quick_xml::events::BytesStart<'_>,
    page: Option<u32>,
    out: &mut Vec<DocElement>,
) {
    if let Some(descr) = attr(e, b"descr")
        && !descr.trim().is_empty()
    {
        out.push(DocElement::new(ElementLabel::Image, descr.trim()).on_page(page));
    }
}

#[cfg(test)]
mod tests {
    use super::super::archive::fixtures::zip_bytes;
    use super::*;

    fn slide(title: &str, body: &[&str]) -> String {
        let paragraphs: String = body
            .iter()
            .map(|p| format!("<a:p><a:r><a:t>{p}</a:t></a:r></a:p>"))
            .collect();
        format!(
            r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
<p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:nvSpPr><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody>{paragraphs}</p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
        )
    }

    #[test]
    fn slides_sorted_numerically() {
        let names = vec![
            "ppt/slides/slide10.xml".to_owned(),
            "ppt/slides/slide2.xml".to_owned(),
            "ppt/slides/_rels/slide2.xml.rels".to_owned(),
            "ppt/slides/slide1.xml".to_owned(),
            "ppt/presentation.xml".to_owned(),
        ];
        assert_eq!(
            slide_names(&names),
            [
                "ppt/slides/slide1.xml",
                "ppt/slides/slide2.xml",
                "ppt/slides/slide10.xml",
            ]
        );
    }

    #[test]
    fn slide_titles_and_bodies() {
        let mut out = Vec::new();
        walk_slide(&slide("Roadmap", &["Phase one", "Phase two"]), Some(3), &mut out).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].label, ElementLabel::Title);
        assert_eq!(out[0].text, "Roadmap");
        assert_eq!(out[1].label, ElementLabel::Paragraph);
        assert_eq!(out[2].text, "Phase two");
        assert!(out.iter().all(|e| e.page == Some(3)));
    }

    #[test]
    fn tables_and_pictures() {
        let xml = r#"<p:sld><p:cSld><p:spTree>
<p:graphicFrame><a:graphic><a:graphicData><a:tbl>
<a:tr><a:tc><a:txBody><a:p><a:r><a:t>Q1</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>10</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
</a:tbl></a:graphicData></a:graphic></p:graphicFrame>
<p:pic><p:nvPicPr><p:cNvPr id="4" name="Picture 3" descr="Revenue chart"/></p:nvPicPr></p:pic>
</p:spTree></p:cSld></p:sld>"#;
        let mut out = Vec::new();
        walk_slide(xml, Some(1), &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, ElementLabel::Table);
        assert_eq!(out[0].text, "Q1 | 10");
        assert_eq!(out[1].label, ElementLabel::Image);
        assert_eq!(out[1].text, "Revenue chart");
    }

    #[test]
    fn presentation_pages_follow_slide_order() {
        let second = slide("Second", &["More text"]);
        let first = slide("First", &["Opening text"]);
        let bytes = zip_bytes(&[
            ("ppt/slides/slide2.xml", second.as_str()),
            ("ppt/slides/slide1.xml", first.as_str()),
        ]);
        let doc = convert(&bytes).unwrap();
        let elements = doc.texts().unwrap();
        assert_eq!(elements[0].text, "First");
        assert_eq!(elements[0].page, Some(1));
        assert_eq!(elements[2].text, "Second");
        assert_eq!(elements[2].page, Some(2));
    }
}
