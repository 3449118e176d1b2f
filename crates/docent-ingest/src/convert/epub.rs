use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use scraper::Html;

use super::archive::{Package, attr, read_properties};
use super::{ConvertError, ConvertedDocument, InputFormat, html};

const CONTAINER: &str = "META-INF/container.xml";

/// Chapters in spine order through the HTML backend; each spine entry is a
/// page.
pub(super) fn convert(bytes: &[u8]) -> Result<ConvertedDocument, ConvertError> {
    let mut pkg = Package::open(bytes)?;
    let container = pkg.read_string(CONTAINER)?;
    let opf_path = rootfile(&container)?
        .ok_or_else(|| ConvertError::Malformed(format!("{CONTAINER} names no rootfile")))?;
    let opf = pkg.read_string(&opf_path)?;
    let properties = read_properties(&opf).unwrap_or_default();
    let chapters = spine(&opf)?;
    let base = opf_path.rsplit_once('/').map_or("", |(dir, _)| dir);

    let mut elements = Vec::new();
    let mut walk = Ok(());
    for (idx, href) in chapters.iter().enumerate() {
        let path = resolve(base, href);
        let page = u32::try_from(idx + 1).ok();
        let result = pkg.read_string(&path).and_then(|markup| {
            html::walk_document(&Html::parse_document(&markup), page, &mut elements)
        });
        if let Err(e) = result {
            walk = Err(e);
            break;
        }
    }
    Ok(ConvertedDocument::from_walk(
        InputFormat::Epub,
        properties,
        elements,
        walk,
    ))
}

fn rootfile(container: &str) -> Result<Option<String>, ConvertError> {
    let mut reader = Reader::from_str(container);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                return Ok(attr(&e, b"full-path"));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Manifest hrefs of the spine's items, in reading order.
fn spine(opf: &str) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(opf);
    let mut manifest = HashMap::new();
    let mut order = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"item" => {
                    if let (Some(id), Some(href)) = (attr(&e, b"id"), attr(&e, b"href")) {
                        manifest.insert(id, href);
                    }
                }
                b"itemref" => {
                    if let Some(idref) = attr(&e, b"idref") {
                        order.push(idref);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(order
        .into_iter()
        .filter_map(|id| {
            let href = manifest.get(&id).cloned();
            if href.is_none() {
                tracing::debug!("spine item {id} missing from manifest");
            }
            href
        })
        .collect())
}

/// Join `href` onto the package directory, folding `.` and `..` segments.
fn resolve(base: &str, href: &str) -> String {
    let href = href.split(['#', '?']).next().unwrap_or(href);
    let mut parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
