use std::borrow::Cow;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use zip::ZipArchive;
use zip::result::ZipError;

use super::{ConvertError, DocumentProperties, InputFormat};

impl From<ZipError> for ConvertError {
    fn from(e: ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

impl From<quick_xml::Error> for ConvertError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

/// Zip container shared by the OOXML, ODF and EPUB backends.
pub(super) struct Package<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    pub(super) fn open(bytes: &'a [u8]) -> Result<Self, ConvertError> {
        Ok(Self {
            zip: ZipArchive::new(Cursor::new(bytes))?,
        })
    }

    pub(super) fn names(&self) -> Vec<String> {
        self.zip.file_names().map(str::to_owned).collect()
    }

    pub(super) fn read_string(&mut self, name: &str) -> Result<String, ConvertError> {
        let mut file = self.zip.by_name(name)?;
        let mut out = String::new();
        file.read_to_string(&mut out)?;
        Ok(out)
    }

    /// `None` when the entry is absent; other failures are errors.
    pub(super) fn read_optional(&mut self, name: &str) -> Result<Option<String>, ConvertError> {
        match self.read_string(name) {
            Ok(text) => Ok(Some(text)),
            Err(ConvertError::Archive(_)) if self.zip.index_for_name(name).is_none() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(super) fn sniff(mut self) -> Option<InputFormat> {
        if let Ok(Some(mimetype)) = self.read_optional("mimetype") {
            return match mimetype.trim() {
                "application/vnd.oasis.opendocument.text" => Some(InputFormat::Odt),
                "application/vnd.oasis.opendocument.spreadsheet" => Some(InputFormat::Ods),
                "application/vnd.oasis.opendocument.presentation" => Some(InputFormat::Odp),
                "application/epub+zip" => Some(InputFormat::Epub),
                _ => None,
            };
        }
        let names = self.names();
        let has = |prefix: &str| names.iter().any(|n| n.starts_with(prefix));
        if has("word/") {
            Some(InputFormat::Docx)
        } else if has("ppt/") {
            Some(InputFormat::Pptx)
        } else if has("xl/") {
            Some(InputFormat::Xlsx)
        } else {
            None
        }
    }
}

pub(super) fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

pub(super) fn text_of(e: &BytesText<'_>) -> Result<String, ConvertError> {
    e.unescape()
        .map(Cow::into_owned)
        .map_err(|err| ConvertError::Xml(err.to_string()))
}

/// Title, creators and creation date from Dublin Core style metadata
/// (`docProps/core.xml`, ODF `meta.xml`, EPUB package documents).
pub(super) fn read_properties(xml: &str) -> Result<DocumentProperties, ConvertError> {
    #[derive(Clone, Copy)]
    enum Field {
        Title,
        Creator,
        Created,
        Date,
    }

    let mut reader = Reader::from_str(xml);
    let mut props = DocumentProperties::default();
    let mut field = None;
    let mut dated = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                field = match e.local_name().as_ref() {
                    b"title" => Some(Field::Title),
                    b"creator" | b"initial-creator" => Some(Field::Creator),
                    b"created" | b"creation-date" => Some(Field::Created),
                    b"date" => Some(Field::Date),
                    _ => None,
                };
            }
            Event::Text(e) => {
                let Some(current) = field else { continue };
                let value = text_of(&e)?;
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                match current {
                    Field::Title if props.title.is_none() => props.title = Some(value.to_owned()),
                    Field::Creator if !props.authors.iter().any(|a| a == value) => {
                        props.authors.push(value.to_owned());
                    }
                    Field::Created => props.created = Some(value.to_owned()),
                    Field::Date if dated.is_none() => dated = Some(value.to_owned()),
                    _ => {}
                }
            }
            Event::End(_) => field = None,
            Event::Eof => break,
            _ => {}
        }
    }

    if props.created.is_none() {
        props.created = dated;
    }
    Ok(props)
}

/// Rows of cell texts rendered one line per row, cells joined with ` | `.
/// Rows without any text are dropped.
pub(super) fn render_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(super) mod fixtures {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;

    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
