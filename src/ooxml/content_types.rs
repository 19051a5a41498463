//! `[Content_Types].xml`: which content type each part has

use quick_xml::events::Event;
use quick_xml::Reader;

use super::xml::{self, local_name};
use crate::error::Result;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub const WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub const WORD_HEADER: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";

/// `(PartName, ContentType)` pairs from the Override entries, part names without the leading slash
pub fn overrides(content_types: &[u8]) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_reader(content_types);
    let mut out = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"Override" => {
                let part = xml::attribute(&e, "PartName")?;
                let content_type = xml::attribute(&e, "ContentType")?;
                if let (Some(part), Some(content_type)) = (part, content_type) {
                    out.push((part.trim_start_matches('/').to_string(), content_type));
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

/// Parts declared with exactly `content_type`
pub fn parts_of_type(content_types: &[u8], content_type: &str) -> Result<Vec<String>> {
    Ok(overrides(content_types)?
        .into_iter()
        .filter(|(_, ct)| ct == content_type)
        .map(|(part, _)| part)
        .collect())
}

/// Declare `part_name` with `content_type`
pub fn add_override(content_types: &[u8], part_name: &str, content_type: &str) -> Result<Vec<u8>> {
    let part_name = format!("/{}", part_name.trim_start_matches('/'));
    xml::append_to_root(content_types, |writer, prefix| {
        xml::write_empty(
            writer,
            &xml::qualified(prefix, "Override"),
            &[("PartName", part_name.as_str()), ("ContentType", content_type)],
        )
    })
}
