use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Language of user-facing guidance.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Locale {
    #[default]
    En,
    ZhCn,
}

/// Message templates for one locale. Placeholders are `{line}`, `{expected}`, `{received}`,
/// `{context}` and `{message}`.
pub(crate) struct Catalog {
    pub line_error: &'static str,
    pub mismatch: &'static str,
    pub generic: &'static str,
    pub found_on_line: &'static str,
    pub found_mismatch: &'static str,
    pub location: &'static str,
    pub check_grammar: &'static str,
    pub suggestions: &'static [&'static str],
    pub parse_error: &'static str,
    pub no_diagram_type: &'static str,
    pub lexical_error: &'static str,
    pub expected_syntax: &'static str,
    pub expected_generic: &'static str,
    pub sequence_error: &'static str,
    pub class_error: &'static str,
    pub flowchart_error: &'static str,
    pub render_error: &'static str,
}

const EN: Catalog = Catalog {
    line_error: "line {line} has a syntax error",
    mismatch: ": expected {expected}, got {received}",
    generic: "syntax error, check against the grammar",
    found_on_line: "Syntax error found on line {line}",
    found_mismatch: ", expected \"{expected}\" but got \"{received}\"",
    location: "\nError location: {context}",
    check_grammar: "The source has a syntax error; check it against the Mermaid grammar",
    suggestions: &[
        "Check that the syntax follows the Mermaid grammar",
        "Make sure every node and connector is written correctly",
        "Look for unclosed brackets or quotes",
        "Try the AI repair action",
    ],
    parse_error: "syntax parsing error: check that the diagram syntax is correct",
    no_diagram_type: "diagram type not recognized: start with a keyword such as graph, sequenceDiagram or classDiagram",
    lexical_error: "lexical error, check node names and connectors",
    expected_syntax: "expected syntax: {expected}, check the statement format",
    expected_generic: "syntax format error: check connectors and node definitions",
    sequence_error: "sequence diagram error: check participant definitions and message format",
    class_error: "class diagram error: check class definitions and relationship syntax",
    flowchart_error: "flowchart error: check node definitions and link syntax",
    render_error: "render error: {message}",
};

const ZH_CN: Catalog = Catalog {
    line_error: "第 {line} 行存在语法错误",
    mismatch: "：期望 {expected}，但得到了 {received}",
    generic: "语法错误，请检查语法是否符合规范",
    found_on_line: "在第 {line} 行发现语法错误",
    found_mismatch: "，期望 \"{expected}\" 但得到了 \"{received}\"",
    location: "\n错误位置：{context}",
    check_grammar: "代码存在语法错误，请检查语法是否符合 Mermaid 规范",
    suggestions: &[
        "检查语法是否符合 Mermaid 规范",
        "确保所有节点和连接线的语法正确",
        "检查是否有未闭合的括号或引号",
        "尝试使用 AI 自动修复功能",
    ],
    parse_error: "语法解析错误：请检查图表语法是否正确",
    no_diagram_type: "未检测到图表类型：请确保以正确的关键字开始（如 graph、sequenceDiagram、classDiagram 等）",
    lexical_error: "词法错误：请检查节点名称和连接符是否正确",
    expected_syntax: "期望的语法：{expected}，请检查语法格式",
    expected_generic: "语法格式错误：请检查连接符和节点定义",
    sequence_error: "时序图错误：请检查参与者定义和消息格式",
    class_error: "类图错误：请检查类定义和关系语法",
    flowchart_error: "流程图错误：请检查节点定义和连接语法",
    render_error: "渲染错误：{message}",
};

impl Locale {
    pub(crate) fn catalog(self) -> &'static Catalog {
        match self {
            Locale::En => &EN,
            Locale::ZhCn => &ZH_CN,
        }
    }
}

/// Structured decomposition of a renderer error. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub summary: String,
    pub expected: Option<String>,
    pub received: Option<String>,
    pub context: Option<String>,
    pub raw: String,
}

const LINE_RULES: &[&str] = &[r"Parse error on line (\d+)", r"line (\d+)", r"at line (\d+)"];
const COLUMN_RULES: &[&str] = &[r"(?i)\bcolumn[ :]+(\d+)", r"(?i)\bcol[ :]+(\d+)"];
const CONTEXT_RULES: &[&str] = &[r"\.\.\.(.*?)\n\s*-+\^", r"\.\.\.(.*?)$"];
const EXPECTED_RULES: &[&str] = &[
    r#"Expecting\s+['"]?([^'"]+)['"]?"#,
    r#"Expected\s+['"]?([^'"]+)['"]?"#,
];
const RECEIVED_RULES: &[&str] = &[
    r#"got\s+['"]?([^'"]+)['"]?"#,
    r#"but found\s+['"]?([^'"]+)['"]?"#,
];

fn compile(rules: &[&str]) -> Vec<Regex> {
    rules
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid diagnostic regex"))
        .collect()
}

static LINE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(LINE_RULES));
static COLUMN: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(COLUMN_RULES));
static CONTEXT: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CONTEXT_RULES));
static EXPECTED: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(EXPECTED_RULES));
static RECEIVED: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(RECEIVED_RULES));

/// First capture of the first rule that matches.
fn first_capture<'a>(rules: &[Regex], text: &'a str) -> Option<&'a str> {
    rules
        .iter()
        .find_map(|rule| rule.captures(text).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str())
}

pub(crate) fn fill(template: &str, pairs: &[(&str, &str)]) -> String {
    pairs.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

/// Parse with English guidance.
pub fn parse(raw: &str) -> Diagnostic {
    parse_localized(raw, Locale::En)
}

pub fn parse_localized(raw: &str, locale: Locale) -> Diagnostic {
    let line: Option<usize> = first_capture(&LINE, raw).and_then(|n| n.parse().ok());
    let column: Option<usize> = first_capture(&COLUMN, raw).and_then(|n| n.parse().ok());
    let context = first_capture(&CONTEXT, raw)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let expected = first_capture(&EXPECTED, raw).map(|s| s.trim().to_string());
    let received = first_capture(&RECEIVED, raw).map(|s| s.trim().to_string());

    let catalog = locale.catalog();
    let summary = match line {
        Some(n) => {
            let mut summary = fill(catalog.line_error, &[("line", &n.to_string())]);
            if let (Some(e), Some(r)) = (&expected, &received) {
                summary.push_str(&fill(catalog.mismatch, &[("expected", e), ("received", r)]));
            }
            summary
        }
        None => catalog.generic.to_string(),
    };

    debug!(line:?, expected:?, received:?; "Parsed diagnostic");

    Diagnostic {
        line,
        column,
        summary,
        expected,
        received,
        context,
        raw: raw.to_string(),
    }
}

/// Line `line_number` (1-based) of `source`, if it exists.
pub fn source_line(source: &str, line_number: usize) -> Option<&str> {
    line_number
        .checked_sub(1)
        .and_then(|idx| source.split('\n').nth(idx))
}

/// Display-ready projection of a [`Diagnostic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDisplay {
    pub title: String,
    pub description: String,
    pub code_snippet: Option<String>,
    pub line_number: Option<usize>,
    /// First line of the raw message mentioning `Error:`, or its first line.
    pub headline: String,
    /// Raw line carrying the parser's expectation list, when present.
    pub expectation: Option<String>,
    pub suggestions: Vec<String>,
}

pub fn format_error_display(diagnostic: &Diagnostic, source: &str) -> ErrorDisplay {
    format_error_display_localized(diagnostic, source, Locale::En)
}

pub fn format_error_display_localized(
    diagnostic: &Diagnostic,
    source: &str,
    locale: Locale,
) -> ErrorDisplay {
    let catalog = locale.catalog();
    let mut description = String::new();
    let mut code_snippet = None;

    match diagnostic.line {
        Some(line) => {
            if let Some(text) = source_line(source, line) {
                code_snippet = Some(text.to_string());
                description = fill(catalog.found_on_line, &[("line", &line.to_string())]);
                if let (Some(e), Some(r)) = (&diagnostic.expected, &diagnostic.received) {
                    description.push_str(&fill(
                        catalog.found_mismatch,
                        &[("expected", e), ("received", r)],
                    ));
                }
                if let Some(context) = &diagnostic.context {
                    description.push_str(&fill(catalog.location, &[("context", context)]));
                }
            }
        }
        None => description = catalog.check_grammar.to_string(),
    }

    let raw_lines: Vec<&str> = diagnostic.raw.lines().collect();
    let headline = raw_lines
        .iter()
        .find(|l| l.contains("Error:"))
        .or(raw_lines.first())
        .map(|l| l.to_string())
        .unwrap_or_else(|| diagnostic.raw.clone());
    let expectation = raw_lines
        .iter()
        .find(|l| l.contains("Expecting"))
        .map(|l| l.to_string());

    ErrorDisplay {
        title: diagnostic.summary.clone(),
        description,
        code_snippet,
        line_number: diagnostic.line,
        headline,
        expectation,
        suggestions: catalog.suggestions.iter().map(|s| s.to_string()).collect(),
    }
}
