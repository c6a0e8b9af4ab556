pub mod provider;

use std::sync::LazyLock;

use log::{info, warn};
use regex::Regex;
use thiserror::Error;

use crate::diagnostic::Diagnostic;

pub use provider::{ChatMessage, ChatProvider, ProviderError, ProviderKind, ProviderRegistry, Role};

const REPAIR_PROMPT: &str = "You are an expert in Mermaid diagram syntax. The user sends a diagram \
that fails to render together with the renderer's error. Fix the syntax errors while keeping the \
diagram's meaning. Reply with only the corrected source inside a single ```mermaid fenced code \
block, with no explanation.";

const EXPLAIN_PROMPT: &str = "You are a diagram explanation assistant who analyses Mermaid \
diagrams. Explain what the diagram means and the flow it describes in plain language.";

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[\w-]*[ \t]*\n)?(.*?)```").expect("valid fence regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("nothing to repair: the last render succeeded")]
    NothingToRepair,
    #[error("the assistant returned no usable source")]
    EmptyReply,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The corrected source in `reply`: the first fenced block if any, else the whole reply.
pub fn extract_source(reply: &str) -> Option<String> {
    let candidate = FENCED_BLOCK
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map_or(reply, |m| m.as_str())
        .trim();

    (!candidate.is_empty()).then(|| candidate.to_string())
}

fn repair_request(source: &str, diagnostic: &Diagnostic) -> String {
    let mut request = String::from("This Mermaid diagram fails to render.\n\n");
    request.push_str(&format!("Problem: {}\n", diagnostic.summary));
    if let Some(line) = diagnostic.line {
        request.push_str(&format!("Line: {line}\n"));
    }
    request.push_str(&format!(
        "Renderer error:\n{}\n\nSource:\n```mermaid\n{}\n```",
        diagnostic.raw.trim(),
        source
    ));
    request
}

/// Builds the conversation, sends it once, and post-processes the reply.
#[derive(Debug, Clone, Default)]
pub struct Repairer {
    prompt: Option<String>,
}

impl Repairer {
    /// `prompt` replaces the built-in repair instruction when set.
    pub fn new(prompt: Option<String>) -> Self {
        Self {
            prompt: prompt.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn repair(
        &self,
        source: &str,
        diagnostic: &Diagnostic,
        provider: &dyn ChatProvider,
    ) -> Result<String, RepairError> {
        let messages = [
            ChatMessage::system(self.prompt.as_deref().unwrap_or(REPAIR_PROMPT)),
            ChatMessage::user(repair_request(source, diagnostic)),
        ];

        let reply = provider.chat(&messages).inspect_err(|e| {
            warn!(provider:% = provider.kind(); "Repair request failed: {}", e);
        })?;

        let corrected = extract_source(&reply.content).ok_or(RepairError::EmptyReply)?;
        info!(
            provider:% = provider.kind(),
            lines = corrected.lines().count();
            "Received corrected source"
        );
        Ok(corrected)
    }

    pub fn explain(&self, source: &str, provider: &dyn ChatProvider) -> Result<String, RepairError> {
        let messages = [
            ChatMessage::system(EXPLAIN_PROMPT),
            ChatMessage::user(format!(
                "Analyse and explain this Mermaid diagram:\n\n```mermaid\n{source}\n```"
            )),
        ];

        let reply = provider.chat(&messages)?;
        let explanation = reply.content.trim();
        if explanation.is_empty() {
            return Err(RepairError::EmptyReply);
        }
        Ok(explanation.to_string())
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::diagnostic::parse;

    struct Scripted {
        reply: Result<String, ProviderError>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl Scripted {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatProvider for Scripted {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn chat(&self, messages: &[ChatMessage]) -> Result<ChatMessage, ProviderError> {
            self.seen.lock().extend_from_slice(messages);
            self.reply.clone().map(ChatMessage::assistant)
        }
    }

    #[test]
    fn extracts_first_fenced_block() {
        let reply = "Here you go:\n```mermaid\ngraph TD\n  A-->B\n```\nand another\n```\nx\n```";
        assert_eq!(extract_source(reply).as_deref(), Some("graph TD\n  A-->B"));
    }

    #[test]
    fn single_line_fence_is_unwrapped() {
        assert_eq!(
            extract_source("```graph TD; A-->B```").as_deref(),
            Some("graph TD; A-->B")
        );
        assert_eq!(
            extract_source("Fixed: ```mermaid \ngraph LR\nA-->B\n```").as_deref(),
            Some("graph LR\nA-->B")
        );
    }

    #[test]
    fn whole_reply_without_fence() {
        assert_eq!(extract_source("  graph TD\nA-->B \n").as_deref(), Some("graph TD\nA-->B"));
        assert_eq!(extract_source("   \n"), None);
        assert_eq!(extract_source("```mermaid\n\n```"), None);
    }

    #[test]
    fn repair_sends_system_and_user_messages() {
        let provider = Scripted::replying("```mermaid\ngraph TD\nA-->B\n```");
        let diagnostic = parse("Parse error on line 2:\nExpecting 'SQE', got 'EOF'");

        let fixed = Repairer::default()
            .repair("graph TD\nA-->B[", &diagnostic, &provider)
            .unwrap();
        assert_eq!(fixed, "graph TD\nA-->B");

        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].role, Role::System);
        assert_eq!(seen[1].role, Role::User);
        assert!(seen[1].content.contains("A-->B["));
        assert!(seen[1].content.contains("Line: 2"));
    }

    #[test]
    fn custom_prompt_replaces_default() {
        let provider = Scripted::replying("graph LR\nA-->B");
        Repairer::new(Some("Fix it.".to_string()))
            .repair("graph LR\nA-->", &parse("boom"), &provider)
            .unwrap();
        assert_eq!(provider.seen.lock()[0].content, "Fix it.");
    }

    #[test]
    fn empty_reply_and_provider_failure() {
        let provider = Scripted::replying("   ");
        assert_eq!(
            Repairer::default().repair("x", &parse("boom"), &provider),
            Err(RepairError::EmptyReply)
        );

        let failing = Scripted {
            reply: Err(ProviderError::Transport("offline".to_string())),
            seen: Mutex::new(Vec::new()),
        };
        let err = Repairer::default()
            .repair("x", &parse("boom"), &failing)
            .unwrap_err();
        assert_eq!(err.to_string(), "network error: offline");
    }

    #[test]
    fn explain_returns_whole_reply() {
        let provider = Scripted::replying("  A flows to B.\n");
        assert_eq!(
            Repairer::default().explain("graph TD\nA-->B", &provider).unwrap(),
            "A flows to B."
        );
    }
}
