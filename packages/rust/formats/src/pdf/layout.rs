//! Styled text runs from a page content stream, rendered as light Markdown.
//!
//! Runs are grouped into lines by text positioning operators. A run becomes
//! a `## ` heading above 14pt effective size, `**bold**` when the bold flag
//! is set, and `*italic*` when the italic flag is set.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::object::{as_dict, as_name, as_number, get, inherited, resolve};

/// Run flag bits.
pub(super) const FLAG_ITALIC: u32 = 1 << 1;
pub(super) const FLAG_BOLD: u32 = 1 << 3;

/// Effective size above which a run is rendered as a heading.
const HEADING_SIZE: f32 = 14.0;

/// TJ displacement (thousandths of an em) treated as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -250.0;

#[derive(Debug, Clone, Copy, Default)]
struct FontStyle {
    flags: u32,
    /// Multi-byte (Type0) font; bytes are CIDs, not characters.
    composite: bool,
}

#[derive(Debug, Clone)]
pub(super) struct Span {
    pub text: String,
    pub size: f32,
    pub flags: u32,
}

/// Render one run with the heading/bold/italic decorations.
pub(super) fn decorate(span: &Span) -> Option<String> {
    let text = span.text.trim();
    if text.is_empty() {
        return None;
    }
    let mut text = text.to_string();
    if span.size > HEADING_SIZE {
        text = format!("## {text}");
    }
    if span.flags & FLAG_BOLD != 0 {
        text = format!("**{text}**");
    }
    if span.flags & FLAG_ITALIC != 0 {
        text = format!("*{text}*");
    }
    Some(text)
}

/// Join decorated runs: runs of a line with a space, lines with a newline.
pub(super) fn render_lines(lines: &[Vec<Span>]) -> String {
    lines
        .iter()
        .filter_map(|line| {
            let parts: Vec<String> = line.iter().filter_map(decorate).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collect styled lines from a page. `None` when the page uses composite
/// fonts whose glyph codes cannot be read as text without a CMap.
pub(super) fn page_lines(doc: &Document, page_id: ObjectId) -> lopdf::Result<Option<Vec<Vec<Span>>>> {
    let fonts = page_fonts(doc, page_id);
    let content = Content::decode(&doc.get_page_content(page_id)?)?;

    let mut state = TextState::new();
    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm_scale),
            "Q" => state.ctm_scale = state.ctm_stack.pop().unwrap_or(1.0),
            "cm" => {
                if let Some(scale) = vertical_scale(operands) {
                    state.ctm_scale *= scale;
                }
            }
            "BT" => {
                state.break_line();
                state.tm_scale = 1.0;
                state.line_y = None;
            }
            "Tf" => {
                if let Some(name) = operands.first().and_then(as_name) {
                    state.font = fonts.get(name).copied().unwrap_or_default();
                    state.font_name = name.to_vec();
                }
                if let Some(size) = operands.get(1).and_then(as_number) {
                    state.font_size = size;
                }
            }
            "Td" | "TD" => {
                let dy = operands.get(1).and_then(as_number).unwrap_or(0.0);
                if dy != 0.0 {
                    state.break_line();
                }
            }
            "T*" => state.break_line(),
            "Tm" => {
                if let Some(scale) = vertical_scale(operands) {
                    state.tm_scale = scale;
                }
                let y = operands.get(5).and_then(as_number);
                if y != state.line_y {
                    state.break_line();
                    state.line_y = y;
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    state.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut bytes = Vec::new();
                    for item in items {
                        match item {
                            Object::String(s, _) => bytes.extend_from_slice(s),
                            other => {
                                if as_number(other).is_some_and(|n| n < TJ_SPACE_THRESHOLD) {
                                    bytes.push(b' ');
                                }
                            }
                        }
                    }
                    state.show(&bytes);
                }
            }
            "'" => {
                state.break_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    state.show(bytes);
                }
            }
            "\"" => {
                state.break_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    state.show(bytes);
                }
            }
            _ => {}
        }
    }
    state.break_line();

    if state.saw_composite {
        return Ok(None);
    }
    Ok(Some(state.lines))
}

struct TextState {
    font: FontStyle,
    font_name: Vec<u8>,
    font_size: f32,
    tm_scale: f32,
    ctm_scale: f32,
    ctm_stack: Vec<f32>,
    line_y: Option<f32>,
    current: Vec<Span>,
    current_font: Vec<u8>,
    lines: Vec<Vec<Span>>,
    saw_composite: bool,
}

impl TextState {
    fn new() -> Self {
        Self {
            font: FontStyle::default(),
            font_name: Vec::new(),
            font_size: 0.0,
            tm_scale: 1.0,
            ctm_scale: 1.0,
            ctm_stack: Vec::new(),
            line_y: None,
            current: Vec::new(),
            current_font: Vec::new(),
            lines: Vec::new(),
            saw_composite: false,
        }
    }

    fn break_line(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(std::mem::take(&mut self.current));
        }
    }

    fn show(&mut self, bytes: &[u8]) {
        if self.font.composite {
            self.saw_composite = true;
            return;
        }
        let text: String = bytes.iter().map(|&b| b as char).collect();
        let size = (self.font_size * self.tm_scale * self.ctm_scale).abs();
        let flags = self.font.flags;

        if let Some(last) = self.current.last_mut() {
            if self.current_font == self.font_name && last.flags == flags && last.size == size {
                last.text.push_str(&text);
                return;
            }
        }
        self.current_font = self.font_name.clone();
        self.current.push(Span { text, size, flags });
    }
}

/// `sqrt(c² + d²)` of an `[a b c d e f]` matrix operand list.
fn vertical_scale(operands: &[Object]) -> Option<f32> {
    let c = as_number(operands.get(2)?)?;
    let d = as_number(operands.get(3)?)?;
    Some((c * c + d * d).sqrt())
}

// ---------------------------------------------------------------------------
// Font styles
// ---------------------------------------------------------------------------

fn page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontStyle> {
    let mut fonts = HashMap::new();
    let Some(resources) = inherited(doc, page_id, b"Resources").and_then(as_dict) else {
        return fonts;
    };
    let Some(font_dict) = get(doc, resources, b"Font").and_then(as_dict) else {
        return fonts;
    };
    for (name, font) in font_dict.iter() {
        if let Some(font) = as_dict(resolve(doc, font)) {
            fonts.insert(name.clone(), font_style(doc, font));
        }
    }
    fonts
}

fn font_style(doc: &Document, font: &Dictionary) -> FontStyle {
    let composite = get(doc, font, b"Subtype").and_then(as_name) == Some(b"Type0".as_slice());
    let mut flags = 0;

    let base = get(doc, font, b"BaseFont")
        .and_then(as_name)
        .map(|n| String::from_utf8_lossy(n).to_lowercase())
        .unwrap_or_default();
    let base = base.split_once('+').map(|(_, rest)| rest.to_string()).unwrap_or(base);
    if ["bold", "black", "heavy", "semibold", "demi"]
        .iter()
        .any(|w| base.contains(w))
    {
        flags |= FLAG_BOLD;
    }
    if base.contains("italic") || base.contains("oblique") {
        flags |= FLAG_ITALIC;
    }

    if let Some(descriptor) = font_descriptor(doc, font) {
        let descriptor_flags = get(doc, descriptor, b"Flags")
            .and_then(as_number)
            .map(|f| f as u32)
            .unwrap_or(0);
        if descriptor_flags & (1 << 6) != 0 {
            flags |= FLAG_ITALIC;
        }
        if descriptor_flags & (1 << 18) != 0 {
            flags |= FLAG_BOLD;
        }
        if get(doc, descriptor, b"FontWeight")
            .and_then(as_number)
            .is_some_and(|w| w >= 600.0)
        {
            flags |= FLAG_BOLD;
        }
        if get(doc, descriptor, b"ItalicAngle")
            .and_then(as_number)
            .is_some_and(|a| a != 0.0)
        {
            flags |= FLAG_ITALIC;
        }
    }

    FontStyle { flags, composite }
}

/// The font's descriptor, looking through `DescendantFonts` for Type0 fonts.
fn font_descriptor<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    if let Some(descriptor) = get(doc, font, b"FontDescriptor").and_then(as_dict) {
        return Some(descriptor);
    }
    match get(doc, font, b"DescendantFonts")? {
        Object::Array(descendants) => {
            let descendant = as_dict(resolve(doc, descendants.first()?))?;
            get(doc, descendant, b"FontDescriptor").and_then(as_dict)
        }
        _ => None,
    }
}
