//! Diagonal text overlay stamped onto every PDF page using lopdf
//!
//! Each page gets its own Form XObject sized to the page's MediaBox. The form
//! draws the watermark three times, rotated about its anchor, in a translucent
//! gray. The original content streams are bracketed with `q`/`Q` so the form is
//! drawn in the page's untransformed coordinate system, on top of everything.

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use rustybuzz::ttf_parser::{GlyphId, OutlineBuilder};
use tracing::debug;

use super::font::{self, WatermarkFont};
use super::page::{self, PageBox};
use crate::error::{Error, Result};
use crate::format::Watermarker;

/// Resource names used inside the overlay form
const FONT_RESOURCE: &str = "WmF";
const GSTATE_RESOURCE: &str = "WmGs";

/// Name the overlay form is registered under on each page
const XOBJECT_NAME: &str = "Watermark";

/// Appearance of the overlay
#[derive(Debug, Clone)]
pub struct OverlayOptions {
    /// Font size in points
    pub font_size: f32,
    /// Gray level of the fill (0 = black, 1 = white)
    pub gray: f32,
    /// Fill opacity
    pub opacity: f32,
    /// Counter-clockwise rotation of each stamp
    pub rotation_degrees: f32,
    /// Stamp centres as fractions of page width/height
    pub anchors: Vec<(f32, f32)>,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            font_size: 30.0,
            gray: 0.7,
            opacity: 0.3,
            rotation_degrees: 45.0,
            anchors: vec![(0.5, 0.5), (0.25, 0.75), (0.75, 0.25)],
        }
    }
}

/// PDF handler
#[derive(Debug, Clone)]
pub struct PdfWatermarker<'f> {
    font: Option<&'f WatermarkFont>,
    options: OverlayOptions,
}

impl PdfWatermarker<'static> {
    /// Use the process-wide font found by the font resolver, if any
    pub fn with_system_font() -> Self {
        Self::new(font::resolved())
    }
}

impl<'f> PdfWatermarker<'f> {
    /// Draw with `font`, or with built-in Helvetica when `None`
    pub fn new(font: Option<&'f WatermarkFont>) -> Self {
        Self {
            font,
            options: OverlayOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OverlayOptions) -> Self {
        self.options = options;
        self
    }

    /// Stamp every page of an already-loaded document
    pub fn stamp_document(&self, doc: &mut Document, text: &str) -> Result<()> {
        let stamp = match self.font {
            Some(font) => outline_stamp(font, text, self.options.font_size)?,
            None => helvetica_stamp(text, self.options.font_size),
        };

        let gstate_id = doc.add_object(Object::Dictionary(transparency_gstate(self.options.opacity)));
        let font_id = match stamp.kind {
            StampKind::Text => Some(doc.add_object(Object::Dictionary(helvetica_font()))),
            StampKind::Outlines => None,
        };

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in page_ids {
            let page_box = page::media_box(doc, page_id)?;
            debug!(
                page = ?page_id,
                width = page_box.width(),
                height = page_box.height(),
                "stamping page"
            );

            let content = self.overlay_content(&stamp, &page_box);
            let form_id = doc.add_object(Object::Stream(overlay_form(
                content,
                &page_box,
                gstate_id,
                font_id,
            )));

            let name = page::add_xobject(doc, page_id, XOBJECT_NAME, form_id)?;
            let invoke = format!("Q\nq\n/{} Do\nQ\n", name);
            page::wrap_contents(doc, page_id, b"q\n".to_vec(), invoke.into_bytes())?;
        }

        Ok(())
    }

    /// Content stream of the overlay form for one page
    fn overlay_content(&self, stamp: &Stamp, page_box: &PageBox) -> String {
        let (sin, cos) = self.options.rotation_degrees.to_radians().sin_cos();
        let gray = fmt_num(self.options.gray);

        let mut content = String::new();
        content.push_str(&format!("/{} gs\n", GSTATE_RESOURCE));
        content.push_str(&format!("{} {} {} rg\n", gray, gray, gray));

        for &(fx, fy) in &self.options.anchors {
            let (x, y) = page_box.point_at(fx, fy);
            content.push_str("q\n");
            content.push_str(&format!("1 0 0 1 {} {} cm\n", fmt_num(x), fmt_num(y)));
            content.push_str(&format!(
                "{} {} {} {} 0 0 cm\n",
                fmt_num(cos),
                fmt_num(sin),
                fmt_num(-sin),
                fmt_num(cos)
            ));
            // Centre the run on the anchor
            content.push_str(&format!("1 0 0 1 {} 0 cm\n", fmt_num(-stamp.width / 2.0)));
            content.push_str(&stamp.ops);
            content.push_str("Q\n");
        }

        content
    }
}

impl Watermarker for PdfWatermarker<'_> {
    fn apply(&self, input: &Path, output: &Path, text: &str) -> Result<()> {
        if !input.exists() {
            return Err(Error::FileNotFound(input.to_path_buf()));
        }

        let mut doc = Document::load(input)?;
        if doc.is_encrypted() {
            // lopdf decrypts files whose user password is empty while loading
            if doc.encryption_state.is_none() {
                return Err(Error::EncryptedPdf(input.to_path_buf()));
            }
            drop_encryption(&mut doc);
        }

        self.stamp_document(&mut doc, text)?;

        doc.compress();
        doc.save(output)?;

        Ok(())
    }
}

/// Forget the encryption dictionary of an already decrypted document so it
/// is written back out as plain objects
fn drop_encryption(doc: &mut Document) {
    if let Some(Object::Reference(id)) = doc.trailer.remove(b"Encrypt") {
        doc.objects.remove(&id);
    }
    doc.encryption_state = None;
    debug!("dropped encryption dictionary of decrypted document");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StampKind {
    /// Helvetica text operators; needs the font resource
    Text,
    /// Filled glyph outlines; self-contained
    Outlines,
}

/// Drawing operators for one copy of the watermark, baseline starting at the origin
#[derive(Debug, Clone)]
struct Stamp {
    kind: StampKind,
    width: f32,
    ops: String,
}

fn helvetica_stamp(text: &str, font_size: f32) -> Stamp {
    let width = helvetica_width(text) * font_size / 1000.0;
    let ops = format!(
        "BT\n/{} {} Tf\n({}) Tj\nET\n",
        FONT_RESOURCE,
        fmt_num(font_size),
        encode_win_ansi(text)
    );
    Stamp {
        kind: StampKind::Text,
        width,
        ops,
    }
}

/// Shape `text` with the font and emit its glyphs as filled paths.
///
/// The paths sit inside an ActualText span so viewers can still select and
/// search the watermark text.
fn outline_stamp(font: &WatermarkFont, text: &str, font_size: f32) -> Result<Stamp> {
    let face = font.face()?;
    let units_per_em = face.units_per_em() as f32;
    if units_per_em <= 0.0 {
        return Err(Error::Font(format!("{} has no units per em", font.path().display())));
    }
    let scale = font_size / units_per_em;

    let mut buffer = rustybuzz::UnicodeBuffer::new();
    buffer.push_str(text);
    let shaped = rustybuzz::shape(&face, &[], buffer);

    let mut path = PathOps::new(scale);
    let mut pen_x = 0i32;
    let mut pen_y = 0i32;
    for (info, pos) in shaped.glyph_infos().iter().zip(shaped.glyph_positions()) {
        path.origin = ((pen_x + pos.x_offset) as f32, (pen_y + pos.y_offset) as f32);
        let glyph = GlyphId(u16::try_from(info.glyph_id).unwrap_or(0));
        if face.outline_glyph(glyph, &mut path).is_some() {
            path.ops.push_str("f\n");
        }
        pen_x += pos.x_advance;
        pen_y += pos.y_advance;
    }

    let mut ops = String::new();
    ops.push_str(&format!("/Span <</ActualText <{}>>> BDC\n", utf16_hex(text)));
    ops.push_str(&path.ops);
    ops.push_str("EMC\n");

    Ok(Stamp {
        kind: StampKind::Outlines,
        width: pen_x as f32 * scale,
        ops,
    })
}

/// Collects glyph outlines as PDF path operators in text space.
///
/// `origin` is the pen position in font units; coordinates are scaled to
/// points before they are rounded, so small scales lose no precision.
struct PathOps {
    scale: f32,
    origin: (f32, f32),
    current: (f32, f32),
    ops: String,
}

impl PathOps {
    fn new(scale: f32) -> Self {
        Self {
            scale,
            origin: (0.0, 0.0),
            current: (0.0, 0.0),
            ops: String::new(),
        }
    }

    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        ((self.origin.0 + x) * self.scale, (self.origin.1 + y) * self.scale)
    }
}

impl OutlineBuilder for PathOps {
    fn move_to(&mut self, x: f32, y: f32) {
        let (px, py) = self.point(x, y);
        self.ops.push_str(&format!("{} {} m\n", fmt_num(px), fmt_num(py)));
        self.current = (px, py);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (px, py) = self.point(x, y);
        self.ops.push_str(&format!("{} {} l\n", fmt_num(px), fmt_num(py)));
        self.current = (px, py);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        // PDF only has cubic curves; raise the quadratic's degree
        let (qx, qy) = self.point(x1, y1);
        let (px, py) = self.point(x, y);
        let (cx, cy) = self.current;
        let c1 = (cx + 2.0 / 3.0 * (qx - cx), cy + 2.0 / 3.0 * (qy - cy));
        let c2 = (px + 2.0 / 3.0 * (qx - px), py + 2.0 / 3.0 * (qy - py));
        self.ops.push_str(&format!(
            "{} {} {} {} {} {} c\n",
            fmt_num(c1.0),
            fmt_num(c1.1),
            fmt_num(c2.0),
            fmt_num(c2.1),
            fmt_num(px),
            fmt_num(py)
        ));
        self.current = (px, py);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (ax, ay) = self.point(x1, y1);
        let (bx, by) = self.point(x2, y2);
        let (px, py) = self.point(x, y);
        self.ops.push_str(&format!(
            "{} {} {} {} {} {} c\n",
            fmt_num(ax),
            fmt_num(ay),
            fmt_num(bx),
            fmt_num(by),
            fmt_num(px),
            fmt_num(py)
        ));
        self.current = (px, py);
    }

    fn close(&mut self) {
        self.ops.push_str("h\n");
    }
}

fn overlay_form(content: String, page_box: &PageBox, gstate_id: ObjectId, font_id: Option<ObjectId>) -> Stream {
    let mut resources = Dictionary::new();

    let mut gstates = Dictionary::new();
    gstates.set(GSTATE_RESOURCE, Object::Reference(gstate_id));
    resources.set("ExtGState", Object::Dictionary(gstates));

    if let Some(font_id) = font_id {
        let mut fonts = Dictionary::new();
        fonts.set(FONT_RESOURCE, Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));
    }

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Form".to_vec()));
    dict.set("FormType", Object::Integer(1));
    dict.set(
        "BBox",
        Object::Array(vec![
            Object::Real(page_box.llx),
            Object::Real(page_box.lly),
            Object::Real(page_box.urx),
            Object::Real(page_box.ury),
        ]),
    );
    dict.set("Resources", Object::Dictionary(resources));

    Stream::new(dict, content.into_bytes())
}

fn transparency_gstate(opacity: f32) -> Dictionary {
    let mut gstate = Dictionary::new();
    gstate.set("Type", Object::Name(b"ExtGState".to_vec()));
    gstate.set("ca", Object::Real(opacity));
    gstate.set("CA", Object::Real(opacity));
    gstate
}

/// Helvetica is one of the 14 standard fonts, so nothing needs embedding
fn helvetica_font() -> Dictionary {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    font
}

/// Encode text for a WinAnsi literal string.
///
/// Latin-1 characters map straight through; anything else has no glyph in
/// Helvetica and becomes a space.
fn encode_win_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let code = ch as u32;
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            _ if (0xA0..=0xFF).contains(&code) => out.push_str(&format!("\\{:03o}", code)),
            _ => out.push(' '),
        }
    }
    out
}

/// Advance width of `text` in Helvetica, in 1/1000 em
fn helvetica_width(text: &str) -> f32 {
    text.chars()
        .map(|ch| match ch {
            ' '..='~' => HELVETICA_WIDTHS[(ch as usize) - 32],
            _ if (0xA0..=0xFF).contains(&(ch as u32)) => 556,
            _ => HELVETICA_WIDTHS[0],
        })
        .map(|w| w as f32)
        .sum()
}

/// Helvetica glyph widths for characters 32-126
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, // space ! " # $ % & '
    333, 333, 389, 584, 278, 333, 278, 278, // ( ) * + , - . /
    556, 556, 556, 556, 556, 556, 556, 556, // 0-7
    556, 556, 278, 278, 584, 584, 584, 556, // 8 9 : ; < = > ?
    1015, 667, 667, 722, 722, 667, 611, 778, // @ A-G
    722, 278, 500, 667, 556, 833, 722, 778, // H-O
    667, 778, 722, 667, 611, 722, 667, 944, // P-W
    667, 667, 611, 278, 278, 278, 469, 556, // X Y Z [ \ ] ^ _
    333, 556, 556, 500, 556, 556, 278, 556, // ` a-g
    556, 222, 222, 500, 222, 833, 556, 556, // h-o
    556, 556, 333, 500, 278, 556, 500, 722, // p-w
    500, 500, 500, 334, 260, 334, 584, // x y z { | } ~
];

/// UTF-16BE with byte-order mark, as hex, for PDF text strings
fn utf16_hex(text: &str) -> String {
    let mut hex = String::from("FEFF");
    for unit in text.encode_utf16() {
        hex.push_str(&format!("{:04X}", unit));
    }
    hex
}

/// Format a number for a content stream without exponent or trailing zeros
fn fmt_num(value: f32) -> String {
    let formatted = format!("{:.4}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(30.0), "30");
        assert_eq!(fmt_num(0.7), "0.7");
        assert_eq!(fmt_num(-0.00001), "0");
        assert_eq!(fmt_num(0.70710677), "0.7071");
    }

    #[test]
    fn test_encode_win_ansi_escapes_and_blanks() {
        assert_eq!(encode_win_ansi("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(encode_win_ansi("é"), "\\351");
        assert_eq!(encode_win_ansi("机密"), "  ");
    }

    #[test]
    fn test_helvetica_width() {
        // "Hi" = 722 + 222
        assert_eq!(helvetica_width("Hi"), 944.0);
        assert_eq!(HELVETICA_WIDTHS.len(), ('~' as usize) - 32 + 1);
    }

    #[test]
    fn test_utf16_hex() {
        assert_eq!(utf16_hex("A"), "FEFF0041");
        assert_eq!(utf16_hex("机"), "FEFF673A");
    }

    #[test]
    fn test_overlay_content_draws_three_rotated_copies() {
        let marker = PdfWatermarker::new(None);
        let stamp = helvetica_stamp("DRAFT", 30.0);
        let page_box = PageBox { llx: 0.0, lly: 0.0, urx: 600.0, ury: 800.0 };

        let content = marker.overlay_content(&stamp, &page_box);

        assert_eq!(content.matches("(DRAFT) Tj").count(), 3);
        assert!(content.contains("0.7 0.7 0.7 rg"));
        assert!(content.contains("/WmGs gs"));
        assert!(content.contains("1 0 0 1 300 400 cm"));
        assert!(content.contains("1 0 0 1 150 600 cm"));
        assert!(content.contains("1 0 0 1 450 200 cm"));
        assert_eq!(content.matches("0.7071 0.7071 -0.7071 0.7071 0 0 cm").count(), 3);
    }

    #[test]
    fn test_helvetica_stamp_is_centred() {
        let stamp = helvetica_stamp("Hi", 10.0);
        assert!((stamp.width - 9.44).abs() < 0.001);
        assert_eq!(stamp.kind, StampKind::Text);
    }

    #[test]
    fn test_quadratic_segments_become_cubics() {
        let mut path = PathOps::new(1.0);
        path.move_to(0.0, 0.0);
        path.quad_to(3.0, 3.0, 6.0, 0.0);
        path.close();

        assert_eq!(path.ops, "0 0 m\n2 2 4 2 6 0 c\nh\n");
    }

    #[test]
    fn test_outline_points_scaled_before_rounding() {
        // 30 pt from a 2048 unit em
        let mut path = PathOps::new(30.0 / 2048.0);
        path.origin = (1024.0, 0.0);
        path.move_to(1024.0, 2048.0);
        path.line_to(0.0, 1000.0);

        assert_eq!(path.ops, "30 30 m\n15 14.6484 l\n");
    }

    #[test]
    fn test_custom_options_change_anchors_and_size() {
        let marker = PdfWatermarker::new(None).with_options(OverlayOptions {
            font_size: 12.0,
            anchors: vec![(0.5, 0.5)],
            rotation_degrees: 0.0,
            ..OverlayOptions::default()
        });
        let stamp = helvetica_stamp("Hi", marker.options.font_size);
        let page_box = PageBox { llx: 0.0, lly: 0.0, urx: 200.0, ury: 100.0 };

        let content = marker.overlay_content(&stamp, &page_box);

        assert_eq!(content.matches("(Hi) Tj").count(), 1);
        assert!(stamp.ops.contains("/WmF 12 Tf"));
        assert!(content.contains("1 0 0 1 100 50 cm"));
        assert!(content.contains("1 0 0 1 0 0 cm"));
        // "Hi" is 944/1000 em wide
        assert!(content.contains("1 0 0 1 -5.664 0 cm"));
    }
}
