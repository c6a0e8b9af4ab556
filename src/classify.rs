use std::sync::LazyLock;

use log::trace;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Diagram,
    RichText,
    Unknown,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Diagram => f.write_str("diagram"),
            ContentKind::RichText => f.write_str("richtext"),
            ContentKind::Unknown => f.write_str("unknown"),
        }
    }
}

/// Outcome plus the name of the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: ContentKind,
    pub rule: Option<&'static str>,
}

const DIAGRAM_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "gantt",
    "pie",
    "journey",
    "gitGraph",
    "mindmap",
];

/// Per-line rich-text markers, tried in order.
const RICH_TEXT_RULES: &[(&str, &str)] = &[
    ("heading", r"^#+ "),
    ("bold", r"\*\*.+\*\*"),
    ("italic", r"\*.+\*"),
    ("link", r"\[.+\]\(.+\)"),
    ("unordered-list", r"^\s*[-*+] "),
    ("ordered-list", r"^\s*\d+\. "),
    ("fenced-code", r"^\s*(```|~~~)"),
    ("table-row", r"^\|.*\|.*\|$"),
    ("table-separator", r"^\|-+\|-+\|"),
    ("blockquote", r"^>.+"),
];

/// Looser table shapes, matched across the whole document (pipe-less tables).
const TABLE_HEADER_SHAPE: &str = r"^\s*\|?[^|]+(\|[^|]+)+\|?\s*$";
const TABLE_SEPARATOR_SHAPE: &str = r"^\s*\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)+\|?\s*$";

struct LineRule {
    name: &'static str,
    pattern: Regex,
}

static DIAGRAM_LEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:{})\b", DIAGRAM_KEYWORDS.join("|"))).expect("valid keyword regex")
});

static DIAGRAM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m)^(?:{})(?:[ \t]|$)", DIAGRAM_KEYWORDS.join("|")))
        .expect("valid keyword regex")
});

static RICH_TEXT: LazyLock<Vec<LineRule>> = LazyLock::new(|| {
    RICH_TEXT_RULES
        .iter()
        .map(|(name, pattern)| LineRule {
            name,
            pattern: Regex::new(pattern).expect("valid rich-text regex"),
        })
        .collect()
});

static TABLE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TABLE_HEADER_SHAPE).expect("valid table regex"));
static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TABLE_SEPARATOR_SHAPE).expect("valid table regex"));

/// Classify `text`. Total and deterministic; empty input is [`ContentKind::Unknown`].
pub fn classify(text: &str) -> ContentKind {
    classify_with_rule(text).kind
}

pub fn classify_with_rule(text: &str) -> Classification {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Classification {
            kind: ContentKind::Unknown,
            rule: None,
        };
    }

    let classification = diagram_rule(trimmed)
        .or_else(|| rich_text_rule(trimmed))
        .or_else(|| table_rule(trimmed))
        .unwrap_or(Classification {
            kind: ContentKind::Unknown,
            rule: None,
        });

    trace!(kind:? = classification.kind, rule:? = classification.rule; "Classified source");
    classification
}

fn diagram_rule(trimmed: &str) -> Option<Classification> {
    let rule = if DIAGRAM_LEAD.is_match(trimmed) {
        "diagram-keyword"
    } else if DIAGRAM_LINE.is_match(trimmed) {
        "diagram-keyword-line"
    } else {
        return None;
    };

    Some(Classification {
        kind: ContentKind::Diagram,
        rule: Some(rule),
    })
}

fn rich_text_rule(trimmed: &str) -> Option<Classification> {
    trimmed.lines().find_map(|line| {
        RICH_TEXT
            .iter()
            .find(|rule| rule.pattern.is_match(line))
            .map(|rule| Classification {
                kind: ContentKind::RichText,
                rule: Some(rule.name),
            })
    })
}

fn table_rule(trimmed: &str) -> Option<Classification> {
    let has_header = trimmed.lines().any(|line| TABLE_HEADER.is_match(line));
    let has_separator = trimmed.lines().any(|line| TABLE_SEPARATOR.is_match(line));

    (has_header && has_separator).then_some(Classification {
        kind: ContentKind::RichText,
        rule: Some("table-structure"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_are_unknown() {
        assert_eq!(classify(""), ContentKind::Unknown);
        assert_eq!(classify("   \n\t  \n"), ContentKind::Unknown);
    }

    #[test]
    fn keyword_at_start_is_diagram() {
        assert_eq!(classify("graph TD\nA-->B"), ContentKind::Diagram);
        assert_eq!(classify("\n\n   sequenceDiagram\n A->>B: hi"), ContentKind::Diagram);
        assert_eq!(classify("stateDiagram-v2\n[*] --> A"), ContentKind::Diagram);
    }

    #[test]
    fn keyword_on_later_line_is_diagram() {
        let text = "%% a comment\npie title Pets\n\"Dogs\" : 386";
        let result = classify_with_rule(text);
        assert_eq!(result.kind, ContentKind::Diagram);
        assert_eq!(result.rule, Some("diagram-keyword-line"));
    }

    #[test]
    fn keyword_prefix_of_longer_word_is_not_diagram() {
        assert_eq!(classify("graphics are nice"), ContentKind::Unknown);
        assert_eq!(classify("piece of cake"), ContentKind::Unknown);
    }

    #[test]
    fn diagram_wins_over_markdown() {
        let text = "flowchart LR\n| a | b |\n|---|---|\n# heading";
        assert_eq!(classify(text), ContentKind::Diagram);
    }

    #[test]
    fn markdown_markers_are_rich_text() {
        let cases = [
            ("# Title", "heading"),
            ("some **bold** text", "bold"),
            ("an *emphasis*", "italic"),
            ("see [docs](https://example.com)", "link"),
            ("- item", "unordered-list"),
            ("1. first", "ordered-list"),
            ("```rust\nfn main() {}\n```", "fenced-code"),
            ("| a | b |", "table-row"),
            ("> quoted", "blockquote"),
        ];
        for (text, rule) in cases {
            let result = classify_with_rule(text);
            assert_eq!(result.kind, ContentKind::RichText, "{text}");
            assert_eq!(result.rule, Some(rule), "{text}");
        }
    }

    #[test]
    fn pipe_less_table_is_rich_text() {
        let text = "name | value\n--- | ---\nfoo | 1";
        let result = classify_with_rule(text);
        assert_eq!(result.kind, ContentKind::RichText);
        assert_eq!(result.rule, Some("table-structure"));
    }

    #[test]
    fn plain_prose_is_unknown() {
        assert_eq!(classify("just some words\nand more words"), ContentKind::Unknown);
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::super::*;

        proptest! {
            #[test]
            fn classification_is_deterministic(text in ".{0,200}") {
                prop_assert_eq!(classify(&text), classify(&text));
            }

            #[test]
            fn keyword_led_text_is_diagram(
                keyword in proptest::sample::select(DIAGRAM_KEYWORDS),
                padding in "[ \t\n]{0,4}",
                body in "[a-zA-Z0-9|\\- \n]{0,80}",
            ) {
                let text = format!("{padding}{keyword} \n| a | b |\n|---|---|\n{body}");
                prop_assert_eq!(classify(&text), ContentKind::Diagram);
            }
        }
    }
}
