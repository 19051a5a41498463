//! Small helpers over quick-xml's event stream
//!
//! Parts are rewritten by copying events from a reader to a writer and
//! splicing new elements in, so everything we do not touch survives verbatim.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::Result;

pub type XmlWriter = Writer<Vec<u8>>;

/// Local part of a qualified name (`w:p` -> `p`)
pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Prefix of a qualified name (`w:p` -> `Some("w")`)
pub fn prefix_of(name: &[u8]) -> Option<String> {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| String::from_utf8_lossy(&name[..i]).into_owned())
}

/// Build `prefix:local`, or just `local` without a prefix
pub fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    }
}

/// Owned copy of an element's qualified name
pub fn name_of(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Value of the attribute whose full name is `key`
pub fn attribute(e: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Value of the first non-namespace attribute whose local name is `local`
pub fn attribute_local(e: &BytesStart, local: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key.starts_with(b"xmlns") {
            continue;
        }
        if local_name(key) == local.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Prefix bound to `namespace` by an `xmlns:*` declaration on `e`
pub fn prefix_for_namespace(e: &BytesStart, namespace: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            if attr.value.as_ref() == namespace.as_bytes() {
                return Ok(Some(String::from_utf8_lossy(prefix).into_owned()));
            }
        }
    }
    Ok(None)
}

/// Copy of `e` with the attribute named `local` set to `value`
pub fn with_attribute(e: &BytesStart, local: &str, value: &str) -> Result<BytesStart<'static>> {
    let name = name_of(e);
    let mut out = BytesStart::new(name.clone());
    let mut replaced = false;

    for attr in e.attributes() {
        let attr = attr?;
        if !replaced && local_name(attr.key.as_ref()) == local.as_bytes() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            out.push_attribute((key.as_str(), value));
            replaced = true;
        } else {
            out.push_attribute(attr);
        }
    }

    if !replaced {
        let key = qualified(prefix_of(name.as_bytes()).as_deref(), local);
        out.push_attribute((key.as_str(), value));
    }

    Ok(out)
}

/// Write `<name attrs.../>`
pub fn write_empty(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut start = BytesStart::new(name);
    for &attr in attrs {
        start.push_attribute(attr);
    }
    writer.write_event(Event::Empty(start))?;
    Ok(())
}

/// Write `<name>text</name>`, escaping the text
pub fn write_text_element(writer: &mut XmlWriter, start: BytesStart, text: &str) -> Result<()> {
    let end = BytesEnd::new(name_of(&start));
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

/// Copy `xml`, letting `insert` write extra children just before the root closes
pub fn append_to_root<F>(xml: &[u8], insert: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut XmlWriter, Option<&str>) -> Result<()>,
{
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut root_prefix: Option<String> = None;
    let mut insert = Some(insert);

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                if depth == 0 {
                    root_prefix = prefix_of(e.name().as_ref());
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if depth == 0 => {
                // Childless root: reopen it so there is somewhere to insert
                let name = name_of(&e);
                let prefix = prefix_of(name.as_bytes());
                writer.write_event(Event::Start(e))?;
                if let Some(insert) = insert.take() {
                    insert(&mut writer, prefix.as_deref())?;
                }
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(insert) = insert.take() {
                        insert(&mut writer, root_prefix.as_deref())?;
                    }
                }
                writer.write_event(Event::End(e))?;
            }
            other => writer.write_event(other)?,
        }
    }

    Ok(writer.into_inner())
}
