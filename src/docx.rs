//! Word watermark: a large light-gray run in each section's header
//!
//! Only header parts (and, when a header has to be created, the package
//! bookkeeping around it) are touched; the body is left byte-for-byte alone
//! apart from the new header reference.

use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::Watermarker;
use crate::ooxml::content_types::{self, CONTENT_TYPES_PART};
use crate::ooxml::relationships::{self, Relationship};
use crate::ooxml::xml::{self, local_name, prefix_of, qualified, XmlWriter};
use crate::ooxml::Package;

/// Paragraph-property children that must follow `w:jc`
const JC_SUCCESSORS: &[&[u8]] = &[
    b"textDirection",
    b"textAlignment",
    b"textboxTightWrap",
    b"outlineLvl",
    b"divId",
    b"cnfStyle",
    b"rPr",
    b"sectPr",
    b"pPrChange",
];

const NEW_HEADER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    "\n",
    r#"<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    r#"<w:p><w:pPr><w:pStyle w:val="Header"/></w:pPr></w:p></w:hdr>"#,
);

/// Styling of the header run
#[derive(Debug, Clone)]
pub struct HeaderRunOptions {
    /// Font size in points
    pub font_size: f32,
    /// Run color as RRGGBB hex
    pub color: String,
}

impl Default for HeaderRunOptions {
    fn default() -> Self {
        Self {
            font_size: 36.0,
            color: "C8C8C8".to_string(),
        }
    }
}

impl HeaderRunOptions {
    /// `w:sz` is measured in half-points
    fn half_points(&self) -> String {
        ((self.font_size * 2.0).round() as u32).to_string()
    }
}

/// Word (.docx) handler
#[derive(Debug, Clone, Default)]
pub struct DocxWatermarker {
    options: HeaderRunOptions,
}

impl DocxWatermarker {
    pub fn new(options: HeaderRunOptions) -> Self {
        Self { options }
    }

    /// Add the watermark run to every section's header.
    ///
    /// A section without its own default header shares the previous section's
    /// header, so that header receives one run per section using it. Re-applying
    /// adds more runs; nothing already there is replaced.
    pub fn stamp_package(&self, package: &mut Package, text: &str) -> Result<()> {
        let main = main_document_part(package)?;
        let sections = section_header_ids(package.require(&main)?)?;
        if sections.is_empty() {
            debug!(part = %main, "document has no sections");
            return Ok(());
        }

        let rels_name = relationships::rels_part_for(&main);
        let rels = match package.part(&rels_name) {
            Some(data) => relationships::parse(data)?,
            None => Vec::new(),
        };

        let mut headers: Vec<String> = Vec::with_capacity(sections.len());
        for id in &sections {
            let header = match id {
                Some(id) => header_target(&rels, id, &main)?,
                None => match headers.last() {
                    Some(previous) => previous.clone(),
                    None => add_header_part(package, &main, &rels_name, &rels)?,
                },
            };
            headers.push(header);
        }

        for header in &headers {
            debug!(part = %header, "appending header run");
            let updated = self.append_run(package.require(header)?, text)?;
            package.set_part(header, updated);
        }

        Ok(())
    }

    /// Center the header's first paragraph and append the watermark run to it
    fn append_run(&self, header: &[u8], text: &str) -> Result<Vec<u8>> {
        let mut reader = Reader::from_reader(header);
        let mut writer = Writer::new(Vec::new());
        let mut depth = 0usize;
        let mut root_prefix: Option<String> = None;
        let mut para_prefix: Option<String> = None;
        let mut state = Para::Seeking;

        loop {
            match reader.read_event()? {
                Event::Eof => break,
                Event::Start(e) => {
                    let name = e.name().as_ref().to_vec();
                    let local = local_name(&name);
                    if depth == 0 {
                        root_prefix = prefix_of(&name);
                    }
                    match state {
                        Para::Seeking if depth == 1 && local == b"p" => {
                            para_prefix = prefix_of(&name);
                            writer.write_event(Event::Start(e))?;
                            state = Para::Open;
                        }
                        Para::Open if local == b"pPr" => {
                            writer.write_event(Event::Start(e))?;
                            state = Para::Props { jc_written: false };
                        }
                        Para::Open => {
                            write_centered_props(&mut writer, para_prefix.as_deref())?;
                            writer.write_event(Event::Start(e))?;
                            state = Para::Body;
                        }
                        Para::Props { jc_written: false } if depth == 3 && local == b"jc" => {
                            writer.write_event(Event::Start(xml::with_attribute(&e, "val", "center")?))?;
                            state = Para::Props { jc_written: true };
                        }
                        Para::Props { jc_written: false } if depth == 3 && JC_SUCCESSORS.contains(&local) => {
                            write_jc(&mut writer, para_prefix.as_deref())?;
                            writer.write_event(Event::Start(e))?;
                            state = Para::Props { jc_written: true };
                        }
                        _ => writer.write_event(Event::Start(e))?,
                    }
                    depth += 1;
                }
                Event::Empty(e) => {
                    let name = e.name().as_ref().to_vec();
                    let local = local_name(&name);
                    match state {
                        Para::Seeking if depth == 1 && local == b"p" => {
                            let prefix = prefix_of(&name);
                            writer.write_event(Event::Start(e))?;
                            write_centered_props(&mut writer, prefix.as_deref())?;
                            self.write_run(&mut writer, prefix.as_deref(), text)?;
                            writer.write_event(Event::End(BytesEnd::new(String::from_utf8_lossy(&name))))?;
                            state = Para::Done;
                        }
                        Para::Open if local == b"pPr" => {
                            writer.write_event(Event::Start(e))?;
                            write_jc(&mut writer, para_prefix.as_deref())?;
                            writer.write_event(Event::End(BytesEnd::new(String::from_utf8_lossy(&name))))?;
                            state = Para::Body;
                        }
                        Para::Open => {
                            write_centered_props(&mut writer, para_prefix.as_deref())?;
                            writer.write_event(Event::Empty(e))?;
                            state = Para::Body;
                        }
                        Para::Props { jc_written: false } if depth == 3 && local == b"jc" => {
                            writer.write_event(Event::Empty(xml::with_attribute(&e, "val", "center")?))?;
                            state = Para::Props { jc_written: true };
                        }
                        Para::Props { jc_written: false } if depth == 3 && JC_SUCCESSORS.contains(&local) => {
                            write_jc(&mut writer, para_prefix.as_deref())?;
                            writer.write_event(Event::Empty(e))?;
                            state = Para::Props { jc_written: true };
                        }
                        _ => writer.write_event(Event::Empty(e))?,
                    }
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    match state {
                        Para::Open if depth == 1 => {
                            write_centered_props(&mut writer, para_prefix.as_deref())?;
                            self.write_run(&mut writer, para_prefix.as_deref(), text)?;
                            state = Para::Done;
                        }
                        Para::Props { jc_written } if depth == 2 => {
                            if !jc_written {
                                write_jc(&mut writer, para_prefix.as_deref())?;
                            }
                            state = Para::Body;
                        }
                        Para::Body if depth == 1 => {
                            self.write_run(&mut writer, para_prefix.as_deref(), text)?;
                            state = Para::Done;
                        }
                        Para::Seeking if depth == 0 => {
                            // Header without any paragraph: add one
                            let prefix = root_prefix.as_deref();
                            let p = qualified(prefix, "p");
                            writer.write_event(Event::Start(BytesStart::new(p.as_str())))?;
                            write_centered_props(&mut writer, prefix)?;
                            self.write_run(&mut writer, prefix, text)?;
                            writer.write_event(Event::End(BytesEnd::new(p.as_str())))?;
                            state = Para::Done;
                        }
                        _ => {}
                    }
                    writer.write_event(Event::End(e))?;
                }
                other => writer.write_event(other)?,
            }
        }

        if state != Para::Done {
            return Err(Error::InvalidPackage("header part has no root element".to_string()));
        }

        Ok(writer.into_inner())
    }

    /// `<w:r><w:rPr>color, size</w:rPr>text</w:r>`, with tabs and line breaks as elements
    fn write_run(&self, writer: &mut XmlWriter, prefix: Option<&str>, text: &str) -> Result<()> {
        let r = qualified(prefix, "r");
        let rpr = qualified(prefix, "rPr");
        let val = qualified(prefix, "val");

        writer.write_event(Event::Start(BytesStart::new(r.as_str())))?;
        writer.write_event(Event::Start(BytesStart::new(rpr.as_str())))?;
        xml::write_empty(writer, &qualified(prefix, "color"), &[(val.as_str(), self.options.color.as_str())])?;
        xml::write_empty(writer, &qualified(prefix, "sz"), &[(val.as_str(), self.options.half_points().as_str())])?;
        writer.write_event(Event::End(BytesEnd::new(rpr.as_str())))?;

        let mut pending = String::new();
        for ch in text.chars() {
            match ch {
                '\t' | '\n' | '\r' => {
                    write_text(writer, prefix, &pending)?;
                    pending.clear();
                    let element = if ch == '\t' { "tab" } else { "br" };
                    xml::write_empty(writer, &qualified(prefix, element), &[])?;
                }
                _ => pending.push(ch),
            }
        }
        write_text(writer, prefix, &pending)?;

        writer.write_event(Event::End(BytesEnd::new(r.as_str())))?;
        Ok(())
    }
}

impl Watermarker for DocxWatermarker {
    fn apply(&self, input: &Path, output: &Path, text: &str) -> Result<()> {
        let mut package = Package::open(input)?;
        self.stamp_package(&mut package, text)?;
        package.save(output)
    }
}

/// Where the header rewrite is relative to the first paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Para {
    /// Looking for the first paragraph directly under the root
    Seeking,
    /// Inside that paragraph, before its first child
    Open,
    /// Inside its paragraph properties
    Props { jc_written: bool },
    /// Past the properties, waiting for the paragraph to close
    Body,
    Done,
}

fn write_jc(writer: &mut XmlWriter, prefix: Option<&str>) -> Result<()> {
    let val = qualified(prefix, "val");
    xml::write_empty(writer, &qualified(prefix, "jc"), &[(val.as_str(), "center")])
}

fn write_centered_props(writer: &mut XmlWriter, prefix: Option<&str>) -> Result<()> {
    let ppr = qualified(prefix, "pPr");
    writer.write_event(Event::Start(BytesStart::new(ppr.as_str())))?;
    write_jc(writer, prefix)?;
    writer.write_event(Event::End(BytesEnd::new(ppr.as_str())))?;
    Ok(())
}

fn write_text(writer: &mut XmlWriter, prefix: Option<&str>, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let t = qualified(prefix, "t");
    let mut start = BytesStart::new(t.as_str());
    start.push_attribute(("xml:space", "preserve"));
    xml::write_text_element(writer, start, text)
}

/// The main document part named by the package relationships
fn main_document_part(package: &Package) -> Result<String> {
    let rels = relationships::parse(package.require(&relationships::rels_part_for(""))?)?;
    rels.iter()
        .find(|r| !r.external && r.is_type(relationships::OFFICE_DOCUMENT))
        .map(|r| relationships::resolve_target("", &r.target))
        .ok_or_else(|| Error::InvalidPackage("no officeDocument relationship".to_string()))
}

/// Default header relationship id of each top-level `w:sectPr`, in document order
fn section_header_ids(document: &[u8]) -> Result<Vec<Option<String>>> {
    let mut reader = Reader::from_reader(document);
    let mut sections: Vec<Option<String>> = Vec::new();
    let mut sect_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                if sect_depth == 0 {
                    sections.push(None);
                }
                sect_depth += 1;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                if sect_depth == 0 {
                    sections.push(None);
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                sect_depth = sect_depth.saturating_sub(1);
            }
            Event::Start(e) | Event::Empty(e)
                if sect_depth == 1 && local_name(e.name().as_ref()) == b"headerReference" =>
            {
                if xml::attribute_local(&e, "type")?.as_deref() == Some("default") {
                    if let Some(slot) = sections.last_mut() {
                        if slot.is_none() {
                            *slot = xml::attribute_local(&e, "id")?;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(sections)
}

fn header_target(rels: &[Relationship], id: &str, main: &str) -> Result<String> {
    rels.iter()
        .find(|r| r.id == id && !r.external)
        .map(|r| relationships::resolve_target(main, &r.target))
        .ok_or_else(|| Error::InvalidPackage(format!("header relationship {} not found", id)))
}

/// Create an empty header part and reference it from the first section
fn add_header_part(package: &mut Package, main: &str, rels_name: &str, rels: &[Relationship]) -> Result<String> {
    let dir = relationships::part_dir(main);
    let mut n = 1;
    let (part, target) = loop {
        let target = format!("header{}.xml", n);
        let part = if dir.is_empty() {
            target.clone()
        } else {
            format!("{}/{}", dir, target)
        };
        if !package.contains(&part) {
            break (part, target);
        }
        n += 1;
    };

    let id = relationships::next_id(rels);
    debug!(part = %part, id = %id, "creating header part");

    package.set_part(&part, NEW_HEADER.as_bytes().to_vec());

    let relationship = Relationship {
        id: id.clone(),
        rel_type: relationships::HEADER.to_string(),
        target,
        external: false,
    };
    let updated_rels = relationships::add(package.part(rels_name), &relationship)?;
    package.set_part(rels_name, updated_rels);

    let updated_types = content_types::add_override(
        package.require(CONTENT_TYPES_PART)?,
        &part,
        content_types::WORD_HEADER,
    )?;
    package.set_part(CONTENT_TYPES_PART, updated_types);

    let updated_document = insert_header_reference(package.require(main)?, &id)?;
    package.set_part(main, updated_document);

    Ok(part)
}

/// Make `w:headerReference` the first child of the first top-level `w:sectPr`
fn insert_header_reference(document: &[u8], id: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(document);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut rel_prefix: Option<String> = None;
    let mut inserted = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                if depth == 0 {
                    rel_prefix = xml::prefix_for_namespace(&e, relationships::RELATIONSHIPS_NAMESPACE)?;
                }
                depth += 1;
                let is_sect = local_name(e.name().as_ref()) == b"sectPr";
                let prefix = prefix_of(e.name().as_ref());
                writer.write_event(Event::Start(e))?;
                if is_sect && !inserted {
                    write_header_reference(&mut writer, prefix.as_deref(), rel_prefix.as_deref(), id)?;
                    inserted = true;
                }
            }
            Event::Empty(e) if !inserted && local_name(e.name().as_ref()) == b"sectPr" => {
                let name = xml::name_of(&e);
                let prefix = prefix_of(name.as_bytes());
                writer.write_event(Event::Start(e))?;
                write_header_reference(&mut writer, prefix.as_deref(), rel_prefix.as_deref(), id)?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
                inserted = true;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            other => writer.write_event(other)?,
        }
    }

    if !inserted {
        return Err(Error::InvalidPackage("document has no section properties".to_string()));
    }

    Ok(writer.into_inner())
}

fn write_header_reference(
    writer: &mut XmlWriter,
    prefix: Option<&str>,
    rel_prefix: Option<&str>,
    id: &str,
) -> Result<()> {
    let type_attr = qualified(prefix, "type");
    match rel_prefix {
        Some(r) => {
            let id_attr = format!("{}:id", r);
            xml::write_empty(
                writer,
                &qualified(prefix, "headerReference"),
                &[(type_attr.as_str(), "default"), (id_attr.as_str(), id)],
            )
        }
        // The root does not bind the relationships namespace; declare it here
        None => xml::write_empty(
            writer,
            &qualified(prefix, "headerReference"),
            &[
                ("xmlns:r", relationships::RELATIONSHIPS_NAMESPACE),
                (type_attr.as_str(), "default"),
                ("r:id", id),
            ],
        ),
    }
}
