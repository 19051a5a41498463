//! Excel watermark: light-gray text in every worksheet's printed page header
//!
//! Only `headerFooter` is edited, so the result shows up in page layout view
//! and in print, never in cells.

use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::error::Result;
use crate::format::Watermarker;
use crate::ooxml::content_types::{self, CONTENT_TYPES_PART};
use crate::ooxml::xml::{self, local_name, prefix_of, qualified, XmlWriter};
use crate::ooxml::Package;

/// Children of `headerFooter`, in schema order
const HEADER_FOOTER_ORDER: &[&[u8]] = &[
    b"oddHeader",
    b"oddFooter",
    b"evenHeader",
    b"evenFooter",
    b"firstHeader",
    b"firstFooter",
];

/// Worksheet children that must follow `headerFooter`
const HF_SUCCESSORS: &[&[u8]] = &[
    b"rowBreaks",
    b"colBreaks",
    b"customProperties",
    b"cellWatches",
    b"ignoredErrors",
    b"smartTags",
    b"drawing",
    b"legacyDrawing",
    b"legacyDrawingHF",
    b"drawingHF",
    b"picture",
    b"oleObjects",
    b"controls",
    b"webPublishItems",
    b"tableParts",
    b"extLst",
];

/// The two headers that receive the watermark
const TARGETS: [&str; 2] = ["oddHeader", "evenHeader"];

/// Styling of the print header text
#[derive(Debug, Clone)]
pub struct PrintHeaderOptions {
    /// Font size in points
    pub font_size: u32,
    /// Font color as RRGGBB hex
    pub color: String,
}

impl Default for PrintHeaderOptions {
    fn default() -> Self {
        Self {
            font_size: 24,
            color: "C0C0C0".to_string(),
        }
    }
}

impl PrintHeaderOptions {
    /// Center-section contents: size and color codes followed by the text
    pub fn center_section(&self, text: &str) -> String {
        format!("&{} &K{}{}", self.font_size, self.color, text.replace('&', "&&"))
    }
}

/// Left, center and right sections of a header string such as `&LPage &P&CTitle`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSections {
    pub left: String,
    pub center: String,
    pub right: String,
}

impl HeaderSections {
    pub fn parse(header: &str) -> Self {
        let mut sections = Self::default();
        let mut current = &mut sections.center;
        let mut chars = header.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != '&' {
                current.push(ch);
                continue;
            }
            match chars.peek().copied() {
                Some('L') => {
                    chars.next();
                    current = &mut sections.left;
                }
                Some('C') => {
                    chars.next();
                    current = &mut sections.center;
                }
                Some('R') => {
                    chars.next();
                    current = &mut sections.right;
                }
                Some('&') => {
                    chars.next();
                    current.push_str("&&");
                }
                _ => current.push('&'),
            }
        }

        sections
    }

    /// Render back to a header string, omitting empty sections
    pub fn to_header_string(&self) -> String {
        let mut out = String::new();
        for (code, section) in [("&L", &self.left), ("&C", &self.center), ("&R", &self.right)] {
            if !section.is_empty() {
                out.push_str(code);
                out.push_str(section);
            }
        }
        out
    }
}

/// Excel (.xlsx) handler
#[derive(Debug, Clone, Default)]
pub struct XlsxWatermarker {
    options: PrintHeaderOptions,
}

impl XlsxWatermarker {
    pub fn new(options: PrintHeaderOptions) -> Self {
        Self { options }
    }

    /// Set the center odd and even page header of every worksheet
    pub fn stamp_package(&self, package: &mut Package, text: &str) -> Result<()> {
        let sheets = content_types::parts_of_type(package.require(CONTENT_TYPES_PART)?, content_types::WORKSHEET)?;
        let center = self.options.center_section(text);

        for sheet in &sheets {
            debug!(part = %sheet, "setting print header");
            let updated = set_center_headers(package.require(sheet)?, &center)?;
            package.set_part(sheet, updated);
        }

        Ok(())
    }
}

impl Watermarker for XlsxWatermarker {
    fn apply(&self, input: &Path, output: &Path, text: &str) -> Result<()> {
        let mut package = Package::open(input)?;
        self.stamp_package(&mut package, text)?;
        package.save(output)
    }
}

fn order_of(local: &[u8]) -> usize {
    HEADER_FOOTER_ORDER
        .iter()
        .position(|name| *name == local)
        .unwrap_or(HEADER_FOOTER_ORDER.len())
}

/// Replace the center section of an existing header string
fn with_center(existing: &str, center: &str) -> String {
    let mut sections = HeaderSections::parse(existing);
    sections.center = center.to_string();
    sections.to_header_string()
}

fn write_header(writer: &mut XmlWriter, prefix: Option<&str>, local: &str, value: &str) -> Result<()> {
    let name = qualified(prefix, local);
    xml::write_text_element(writer, BytesStart::new(name.as_str()), value)
}

/// Write the targets not yet present whose schema position is before `before`
fn write_missing(
    writer: &mut XmlWriter,
    prefix: Option<&str>,
    done: &mut [bool; 2],
    before: usize,
    center: &str,
) -> Result<()> {
    for (i, target) in TARGETS.iter().enumerate() {
        if !done[i] && order_of(target.as_bytes()) < before {
            write_header(writer, prefix, target, &with_center("", center))?;
            done[i] = true;
        }
    }
    Ok(())
}

fn write_header_footer(writer: &mut XmlWriter, prefix: Option<&str>, center: &str) -> Result<()> {
    let name = qualified(prefix, "headerFooter");
    writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
    write_missing(writer, prefix, &mut [false; 2], HEADER_FOOTER_ORDER.len(), center)?;
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

/// Rewrite a worksheet so both odd and even headers carry `center`
fn set_center_headers(sheet: &[u8], center: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(sheet);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut root_prefix: Option<String> = None;
    let mut in_header_footer = false;
    let mut hf_prefix: Option<String> = None;
    let mut done = [false; 2];
    let mut written = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                let local = local_name(&name);
                if depth == 0 {
                    root_prefix = prefix_of(&name);
                }

                if depth == 1 && !written && local == b"headerFooter" {
                    hf_prefix = prefix_of(&name);
                    in_header_footer = true;
                    written = true;
                    writer.write_event(Event::Start(e))?;
                    depth += 1;
                    continue;
                }

                if depth == 1 && !written && HF_SUCCESSORS.contains(&local) {
                    write_header_footer(&mut writer, root_prefix.as_deref(), center)?;
                    written = true;
                }

                if in_header_footer && depth == 2 {
                    let prefix = hf_prefix.clone();
                    write_missing(&mut writer, prefix.as_deref(), &mut done, order_of(local), center)?;
                    if let Some(i) = TARGETS.iter().position(|t| t.as_bytes() == local) {
                        let raw = reader.read_text(e.name())?;
                        let existing = quick_xml::escape::unescape(&raw).map_err(quick_xml::Error::from)?;
                        let local = String::from_utf8_lossy(local).into_owned();
                        write_header(&mut writer, prefix.as_deref(), &local, &with_center(&existing, center))?;
                        done[i] = true;
                        continue;
                    }
                }

                writer.write_event(Event::Start(e))?;
                depth += 1;
            }
            Event::Empty(e) => {
                let name = e.name().as_ref().to_vec();
                let local = local_name(&name);

                if depth == 1 && !written && local == b"headerFooter" {
                    let prefix = prefix_of(&name);
                    writer.write_event(Event::Start(e))?;
                    write_missing(&mut writer, prefix.as_deref(), &mut done, HEADER_FOOTER_ORDER.len(), center)?;
                    writer.write_event(Event::End(BytesEnd::new(String::from_utf8_lossy(&name))))?;
                    written = true;
                    continue;
                }

                if depth == 1 && !written && HF_SUCCESSORS.contains(&local) {
                    write_header_footer(&mut writer, root_prefix.as_deref(), center)?;
                    written = true;
                }

                if in_header_footer && depth == 2 {
                    let prefix = hf_prefix.clone();
                    write_missing(&mut writer, prefix.as_deref(), &mut done, order_of(local), center)?;
                    if let Some(i) = TARGETS.iter().position(|t| t.as_bytes() == local) {
                        let local = String::from_utf8_lossy(local).into_owned();
                        write_header(&mut writer, prefix.as_deref(), &local, &with_center("", center))?;
                        done[i] = true;
                        continue;
                    }
                }

                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if in_header_footer && depth == 1 {
                    let prefix = hf_prefix.clone();
                    write_missing(&mut writer, prefix.as_deref(), &mut done, HEADER_FOOTER_ORDER.len(), center)?;
                    in_header_footer = false;
                }
                if depth == 0 && !written {
                    write_header_footer(&mut writer, root_prefix.as_deref(), center)?;
                    written = true;
                }
                writer.write_event(Event::End(e))?;
            }
            other => writer.write_event(other)?,
        }
    }

    Ok(writer.into_inner())
}
