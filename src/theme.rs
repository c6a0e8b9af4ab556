use serde::{Deserialize, Serialize};

const GITHUB_LIGHT_BACKGROUND: &str = "#ffffff";
const GITHUB_LIGHT_TEXT: &str = "#24292f";
const GITHUB_LIGHT_HEADING: &str = "#1b1f23";
const GITHUB_LIGHT_LINK: &str = "#0969da";
const GITHUB_LIGHT_CODE_BG: &str = "#f6f8fa";
const GITHUB_LIGHT_CODE_TEXT: &str = "#24292f";
const GITHUB_LIGHT_QUOTE_BORDER: &str = "#d0d7de";
const GITHUB_LIGHT_QUOTE_TEXT: &str = "#57606a";

const GITHUB_DARK_BACKGROUND: &str = "#0d1117";
const GITHUB_DARK_TEXT: &str = "#c9d1d9";
const GITHUB_DARK_HEADING: &str = "#e6edf3";
const GITHUB_DARK_LINK: &str = "#58a6ff";
const GITHUB_DARK_CODE_BG: &str = "#161b22";
const GITHUB_DARK_CODE_TEXT: &str = "#c9d1d9";
const GITHUB_DARK_QUOTE_BORDER: &str = "#30363d";
const GITHUB_DARK_QUOTE_TEXT: &str = "#8b949e";

/// Backdrop painted behind exported diagrams.
const EXPORT_LIGHT_BACKDROP: &str = "#ffffff";
const EXPORT_DARK_BACKDROP: &str = "#1a1a1a";

/// Light or dark presentation, chosen by the host and threaded through rendering and export.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

impl ColorScheme {
    pub fn is_dark(self) -> bool {
        matches!(self, ColorScheme::Dark)
    }

    /// Theme name understood by mermaid-compatible engines.
    pub fn engine_theme(self) -> &'static str {
        match self {
            ColorScheme::Light => "default",
            ColorScheme::Dark => "dark",
        }
    }
}

impl std::fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorScheme::Light => f.write_str("light"),
            ColorScheme::Dark => f.write_str("dark"),
        }
    }
}

/// Colors used by the standalone HTML export and the raster backdrop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Palette {
    pub background_color: String,
    pub text_color: String,
    pub heading_color: String,
    pub link_color: String,
    pub code_bg_color: String,
    pub code_text_color: String,
    pub quote_border_color: String,
    pub quote_text_color: String,
    pub backdrop_color: String,
}

impl Palette {
    pub fn github_light() -> Self {
        Palette {
            background_color: GITHUB_LIGHT_BACKGROUND.to_string(),
            text_color: GITHUB_LIGHT_TEXT.to_string(),
            heading_color: GITHUB_LIGHT_HEADING.to_string(),
            link_color: GITHUB_LIGHT_LINK.to_string(),
            code_bg_color: GITHUB_LIGHT_CODE_BG.to_string(),
            code_text_color: GITHUB_LIGHT_CODE_TEXT.to_string(),
            quote_border_color: GITHUB_LIGHT_QUOTE_BORDER.to_string(),
            quote_text_color: GITHUB_LIGHT_QUOTE_TEXT.to_string(),
            backdrop_color: EXPORT_LIGHT_BACKDROP.to_string(),
        }
    }

    pub fn github_dark() -> Self {
        Palette {
            background_color: GITHUB_DARK_BACKGROUND.to_string(),
            text_color: GITHUB_DARK_TEXT.to_string(),
            heading_color: GITHUB_DARK_HEADING.to_string(),
            link_color: GITHUB_DARK_LINK.to_string(),
            code_bg_color: GITHUB_DARK_CODE_BG.to_string(),
            code_text_color: GITHUB_DARK_CODE_TEXT.to_string(),
            quote_border_color: GITHUB_DARK_QUOTE_BORDER.to_string(),
            quote_text_color: GITHUB_DARK_QUOTE_TEXT.to_string(),
            backdrop_color: EXPORT_DARK_BACKDROP.to_string(),
        }
    }

    pub fn for_scheme(scheme: ColorScheme) -> Self {
        match scheme {
            ColorScheme::Light => Self::github_light(),
            ColorScheme::Dark => Self::github_dark(),
        }
    }

    pub fn backdrop_rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.backdrop_color).unwrap_or([255, 255, 255])
    }
}

/// Parse `#rgb` or `#rrggbb` into an RGB triple.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().strip_prefix('#')?;
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (slot, ch) in out.iter_mut().zip(hex.chars()) {
                let v = ch.to_digit(16)? as u8;
                *slot = v * 16 + v;
            }
            Some(out)
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some([r, g, b])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorScheme, Palette, parse_hex_color};

    #[test]
    fn parses_short_and_long_hex() {
        assert_eq!(parse_hex_color("#fff"), Some([255, 255, 255]));
        assert_eq!(parse_hex_color("#1a1a1a"), Some([26, 26, 26]));
        assert_eq!(parse_hex_color("1a1a1a"), None);
        assert_eq!(parse_hex_color("#12345"), None);
    }

    #[test]
    fn dark_palette_uses_dark_backdrop() {
        assert_eq!(Palette::for_scheme(ColorScheme::Dark).backdrop_rgb(), [26, 26, 26]);
        assert_eq!(Palette::for_scheme(ColorScheme::Light).backdrop_rgb(), [255, 255, 255]);
    }

    #[test]
    fn scheme_deserializes_lowercase() {
        let scheme: ColorScheme = serde_json::from_str("\"dark\"").expect("valid scheme");
        assert!(scheme.is_dark());
        assert_eq!(scheme.engine_theme(), "dark");
    }
}
