//! Relationship parts (`_rels/*.rels`) linking a part to the parts it uses

use quick_xml::events::Event;
use quick_xml::Reader;

use super::xml::{self, local_name};
use crate::error::Result;

pub const OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const HEADER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";

/// Namespace bound to the `r:` prefix in document parts
pub const RELATIONSHIPS_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const EMPTY_RELATIONSHIPS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    "\n",
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#,
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Type match that also accepts the Strict-conformance namespace
    pub fn is_type(&self, rel_type: &str) -> bool {
        let suffix = rel_type.rsplit('/').next().unwrap_or(rel_type);
        self.rel_type == rel_type || self.rel_type.ends_with(&format!("/{}", suffix))
    }
}

/// All relationships in a `.rels` part
pub fn parse(rels: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(rels);
    let mut out = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"Relationship" => {
                let id = xml::attribute(&e, "Id")?.unwrap_or_default();
                let rel_type = xml::attribute(&e, "Type")?.unwrap_or_default();
                let target = xml::attribute(&e, "Target")?.unwrap_or_default();
                let external = xml::attribute(&e, "TargetMode")?.as_deref() == Some("External");
                out.push(Relationship { id, rel_type, target, external });
            }
            _ => {}
        }
    }

    Ok(out)
}

/// Name of the relationship part belonging to `part` (`""` for the package itself)
pub fn rels_part_for(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None if part.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{}.rels", part),
    }
}

/// Directory of a part name, without trailing slash
pub fn part_dir(part: &str) -> &str {
    part.trim_start_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

/// Resolve a relationship target against the part that owns the relationship
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = part_dir(source_part)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// First `rIdN` not used by any relationship
pub fn next_id(rels: &[Relationship]) -> String {
    let max = rels
        .iter()
        .filter_map(|r| r.id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

/// Append a relationship, creating the part when `rels` is `None`
pub fn add(rels: Option<&[u8]>, relationship: &Relationship) -> Result<Vec<u8>> {
    let rels = rels.unwrap_or(EMPTY_RELATIONSHIPS.as_bytes());
    xml::append_to_root(rels, |writer, prefix| {
        let mut attrs = vec![
            ("Id", relationship.id.as_str()),
            ("Type", relationship.rel_type.as_str()),
            ("Target", relationship.target.as_str()),
        ];
        if relationship.external {
            attrs.push(("TargetMode", "External"));
        }
        xml::write_empty(writer, &xml::qualified(prefix, "Relationship"), &attrs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
<Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>
<Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/>
</Relationships>"#;

    #[test]
    fn test_parse() {
        let rels = parse(DOC_RELS.as_bytes()).unwrap();
        assert_eq!(rels.len(), 3);
        assert_eq!(rels[1].id, "rId7");
        assert!(rels[1].is_type(HEADER));
        assert!(rels[2].external);
        assert_eq!(rels[2].target, "https://example.com/?a=1&b=2");
    }

    #[test]
    fn test_strict_namespace_type_matches() {
        let rel = Relationship {
            id: "rId1".into(),
            rel_type: "http://purl.oclc.org/ooxml/officeDocument/relationships/officeDocument".into(),
            target: "word/document.xml".into(),
            external: false,
        };
        assert!(rel.is_type(OFFICE_DOCUMENT));
        assert!(!rel.is_type(HEADER));
    }

    #[test]
    fn test_rels_part_for() {
        assert_eq!(rels_part_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_part_for("/xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_part_for(""), "_rels/.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("word/document.xml", "header1.xml"), "word/header1.xml");
        assert_eq!(resolve_target("word/document.xml", "/word/header2.xml"), "word/header2.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "../docProps/app.xml"), "docProps/app.xml");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
        assert_eq!(resolve_target("", "./word/document.xml"), "word/document.xml");
    }

    #[test]
    fn test_next_id() {
        let rels = parse(DOC_RELS.as_bytes()).unwrap();
        assert_eq!(next_id(&rels), "rId10");
        assert_eq!(next_id(&[]), "rId1");
    }

    #[test]
    fn test_add_creates_missing_part() {
        let rel = Relationship {
            id: "rId1".into(),
            rel_type: HEADER.into(),
            target: "header1.xml".into(),
            external: false,
        };
        let created = add(None, &rel).unwrap();
        assert_eq!(parse(&created).unwrap(), vec![rel]);
    }
}
