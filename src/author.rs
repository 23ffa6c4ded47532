//! Author lookup for office documents
//!
//! OOXML documents are zip containers; the author lives in the
//! `dc:creator` element of `docProps/core.xml`.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::{Read, Seek};
use zip::result::ZipError;
use zip::ZipArchive;

/// Extensions whose author is looked up
pub const OFFICE_EXTENSIONS: &[&str] = &["docx", "docm", "xlsx", "xlsm", "pptx", "pptm"];

/// Core properties part inside the container
const CORE_PROPERTIES: &str = "docProps/core.xml";

/// Largest core properties part that will be read
const MAX_CORE_PROPERTIES_LEN: u64 = 1024 * 1024;

/// Check whether an extension (lowercase, without dot) is an office document
pub fn is_office_document(ext: &str) -> bool {
    OFFICE_EXTENSIONS.contains(&ext)
}

/// Read the author of an office document.
///
/// Fails only when the container itself cannot be opened. A missing or
/// unreadable properties part yields `Ok(None)`.
pub fn read_author<R: Read + Seek>(reader: R) -> Result<Option<String>, ZipError> {
    let mut archive = ZipArchive::new(reader)?;
    let part = match archive.by_name(CORE_PROPERTIES) {
        Ok(part) => part,
        Err(e) => {
            log::debug!("No readable {}: {}", CORE_PROPERTIES, e);
            return Ok(None);
        }
    };

    let mut xml = String::new();
    if part
        .take(MAX_CORE_PROPERTIES_LEN)
        .read_to_string(&mut xml)
        .is_err()
    {
        return Ok(None);
    }
    Ok(parse_creator(&xml))
}

/// Extract the trimmed `creator` element text from core properties XML
pub fn parse_creator(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_creator = false;
    let mut author = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"creator" => in_creator = true,
            Ok(Event::Text(t)) if in_creator => author.push_str(&t.unescape().ok()?),
            Ok(Event::End(e)) if e.local_name().as_ref() == b"creator" => break,
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    let author = author.trim();
    if author.is_empty() {
        None
    } else {
        Some(author.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn core_xml(creator: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Quarterly Report</dc:title>
  {creator}
  <cp:lastModifiedBy>Bob</cp:lastModifiedBy>
</cp:coreProperties>"#
        )
    }

    fn container(parts: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn test_office_extensions() {
        assert!(is_office_document("docx"));
        assert!(is_office_document("xlsm"));
        assert!(is_office_document("pptx"));
        assert!(!is_office_document("doc"));
        assert!(!is_office_document("pdf"));
    }

    #[test]
    fn test_parse_creator() {
        let xml = core_xml("<dc:creator>Alice Smith</dc:creator>");
        assert_eq!(parse_creator(&xml), Some("Alice Smith".to_string()));

        let escaped = core_xml("<dc:creator>R&amp;D Team</dc:creator>");
        assert_eq!(parse_creator(&escaped), Some("R&D Team".to_string()));
    }

    #[test]
    fn test_missing_or_empty_creator() {
        assert_eq!(parse_creator(&core_xml("")), None);
        assert_eq!(parse_creator(&core_xml("<dc:creator/>")), None);
        assert_eq!(parse_creator(&core_xml("<dc:creator>   </dc:creator>")), None);
        assert_eq!(parse_creator("<not-closed"), None);
    }

    #[test]
    fn test_read_author_from_container() {
        let xml = core_xml("<dc:creator>Alice</dc:creator>");
        let doc = container(&[("[Content_Types].xml", "<Types/>"), (CORE_PROPERTIES, &xml)]);
        assert_eq!(read_author(doc).unwrap(), Some("Alice".to_string()));
    }

    #[test]
    fn test_container_without_properties() {
        let doc = container(&[("word/document.xml", "<w:document/>")]);
        assert_eq!(read_author(doc).unwrap(), None);
    }

    #[test]
    fn test_corrupt_container_fails() {
        let garbage = Cursor::new(b"this is not a zip archive".to_vec());
        assert!(read_author(garbage).is_err());
    }
}
