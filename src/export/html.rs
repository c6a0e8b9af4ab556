use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::theme::{ColorScheme, Palette};
use crate::xml::escape_xml;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

fn highlight_theme(scheme: ColorScheme) -> &'static str {
    match scheme {
        ColorScheme::Light => "InspiredGitHub",
        ColorScheme::Dark => "base16-ocean.dark",
    }
}

fn highlight(code: &str, lang: &str, scheme: ColorScheme) -> String {
    let syntax = SYNTAXES
        .find_syntax_by_token(lang)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());

    THEMES
        .themes
        .get(highlight_theme(scheme))
        .and_then(|theme| highlighted_html_for_string(code, &SYNTAXES, syntax, theme).ok())
        .unwrap_or_else(|| format!("<pre><code>{}</code></pre>", escape_xml(code)))
}

/// Markdown body rendered to HTML, with fenced code highlighted.
pub fn render_body(markdown: &str, scheme: ColorScheme) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut events = Vec::new();
    let mut code: Option<(String, String)> = None;

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some((lang, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, buffer)) = code.take() {
                    events.push(Event::Html(highlight(&buffer, &lang, scheme).into()));
                }
            }
            Event::Text(text) if code.is_some() => {
                if let Some((_, buffer)) = code.as_mut() {
                    buffer.push_str(&text);
                }
            }
            event if code.is_none() => events.push(event),
            _ => {}
        }
    }

    let mut body = String::new();
    html::push_html(&mut body, events.into_iter());
    body
}

fn stylesheet(palette: &Palette) -> String {
    format!(
        "body {{ margin: 0; background: {bg}; color: {text}; }}\n\
         .markdown-body {{ box-sizing: border-box; max-width: 980px; margin: 0 auto; padding: 32px; \
         font-family: -apple-system, BlinkMacSystemFont, \"Segoe UI\", Helvetica, Arial, sans-serif; \
         font-size: 16px; line-height: 1.5; }}\n\
         h1, h2, h3, h4, h5, h6 {{ color: {heading}; }}\n\
         a {{ color: {link}; }}\n\
         code {{ background: {code_bg}; color: {code_text}; padding: 0.2em 0.4em; border-radius: 6px; }}\n\
         pre {{ padding: 16px; overflow: auto; border-radius: 6px; }}\n\
         pre code {{ background: none; padding: 0; }}\n\
         blockquote {{ margin: 0; padding: 0 1em; color: {quote_text}; border-left: 0.25em solid {quote_border}; }}\n\
         table {{ border-collapse: collapse; }}\n\
         th, td {{ padding: 6px 13px; border: 1px solid {quote_border}; }}\n",
        bg = palette.background_color,
        text = palette.text_color,
        heading = palette.heading_color,
        link = palette.link_color,
        code_bg = palette.code_bg_color,
        code_text = palette.code_text_color,
        quote_text = palette.quote_text_color,
        quote_border = palette.quote_border_color,
    )
}

/// Complete document with inline styles; no external resources.
pub fn render_document(markdown: &str, scheme: ColorScheme, title: &str) -> String {
    let palette = Palette::for_scheme(scheme);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\n{css}</style>\n</head>\n<body>\n<article class=\"markdown-body\">\n{body}</article>\n</body>\n</html>\n",
        title = escape_xml(title),
        css = stylesheet(&palette),
        body = render_body(markdown, scheme),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headings_lists_and_tasks() {
        let body = render_body("# Title\n- item one\n- [x] done\n\n~~gone~~", ColorScheme::Light);
        assert!(body.contains("<h1>Title</h1>"));
        assert!(body.contains("<li>item one</li>"));
        assert!(body.contains("checkbox"));
        assert!(body.contains("<del>gone</del>"));
    }

    #[test]
    fn fenced_code_is_highlighted() {
        let body = render_body("```rust\nfn main() {}\n```", ColorScheme::Light);
        assert!(body.contains("<pre style="));
        assert!(!body.contains("<code class=\"language-rust\">"));
    }

    #[test]
    fn tables_render() {
        let body = render_body("| a | b |\n|---|---|\n| 1 | 2 |", ColorScheme::Dark);
        assert!(body.contains("<table>"));
        assert!(body.contains("<td>2</td>"));
    }

    #[test]
    fn document_uses_scheme_palette() {
        let doc = render_document("text", ColorScheme::Dark, "a <b>");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("background: #0d1117"));
        assert!(doc.contains("<title>a &lt;b&gt;</title>"));
    }
}
