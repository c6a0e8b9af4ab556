use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader as XmlReader;

/// XML 1.0 valid char ranges:
/// - 0x09, 0x0A, 0x0D
/// - 0x20..=0xD7FF
/// - 0xE000..=0xFFFD
/// - 0x10000..=0x10FFFF
fn is_valid_xml_char(c: char) -> bool {
    matches!(
        c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF
    )
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if !is_valid_xml_char(c) {
            continue;
        }
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Raw sizing attributes of the outermost `<svg>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootAttributes {
    pub width: Option<String>,
    pub height: Option<String>,
    pub view_box: Option<String>,
    pub preserve_aspect_ratio: Option<String>,
}

/// Read the sizing attributes of the first `<svg>` element.
///
/// Returns `Ok(None)` when the document has no `<svg>` element at all.
pub fn read_root_attributes(svg: &str) -> Result<Option<RootAttributes>, String> {
    let mut reader = XmlReader::from_str(svg);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) | Ok(XmlEvent::Empty(ref e)) => {
                if e.name().local_name().as_ref() != b"svg" {
                    return Ok(None);
                }

                let mut attrs = RootAttributes::default();
                for attr in e.attributes().filter_map(|a| a.ok()) {
                    let value = String::from_utf8_lossy(&attr.value).trim().to_string();
                    match attr.key.local_name().as_ref() {
                        b"width" => attrs.width = Some(value),
                        b"height" => attrs.height = Some(value),
                        b"viewBox" => attrs.view_box = Some(value),
                        b"preserveAspectRatio" => attrs.preserve_aspect_ratio = Some(value),
                        _ => {}
                    }
                }
                return Ok(Some(attrs));
            }
            Ok(XmlEvent::Eof) => return Ok(None),
            Err(e) => return Err(format!("XML parse error: {}", e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Convert an SVG length to pixels. Relative units (`%`, `em`, `ex`) are not absolute.
pub fn absolute_length(value: &str) -> Option<f32> {
    const UNITS: &[(&str, f32)] = &[
        ("px", 1.0),
        ("pt", 4.0 / 3.0),
        ("pc", 16.0),
        ("in", 96.0),
        ("cm", 96.0 / 2.54),
        ("mm", 96.0 / 25.4),
    ];

    let value = value.trim();
    if value.is_empty() || value.ends_with('%') || value.ends_with("em") || value.ends_with("ex") {
        return None;
    }

    let (number, factor) = UNITS
        .iter()
        .find_map(|(suffix, factor)| value.strip_suffix(suffix).map(|n| (n, *factor)))
        .unwrap_or((value, 1.0));

    let parsed: f32 = number.trim().parse().ok()?;
    let px = parsed * factor;
    (px.is_finite() && px > 0.0).then_some(px)
}

/// Parse a `viewBox` attribute into `(min_x, min_y, width, height)`.
pub fn parse_view_box(value: &str) -> Option<(f32, f32, f32, f32)> {
    let numbers: Vec<f32> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;

    match numbers.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 && w.is_finite() && h.is_finite() => {
            Some((*x, *y, *w, *h))
        }
        _ => None,
    }
}
