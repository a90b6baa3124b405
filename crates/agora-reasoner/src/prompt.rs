//! Prompt template loading and rendering via `minijinja`.
//!
//! The crate ships built-in templates compiled into the binary. Operators
//! can override any of them by pointing `TEMPLATES_DIR` at a directory that
//! contains a file of the same name; templates missing from that directory
//! fall back to the built-in text.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;

use crate::error::ReasonerError;

/// Built-in templates as `(name, file, source)`.
const BUILTIN_TEMPLATES: [(&str, &str, &str); 5] = [
    ("system", "system.j2", include_str!("../templates/system.j2")),
    ("decide", "decide.j2", include_str!("../templates/decide.j2")),
    ("turn", "turn.j2", include_str!("../templates/turn.j2")),
    ("summary", "summary.j2", include_str!("../templates/summary.j2")),
    ("chat", "chat.j2", include_str!("../templates/chat.j2")),
];

/// Which question is being put to the reasoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Should the agent start a conversation?
    Decide,
    /// What does the speaker say next?
    Turn,
    /// How does the agent remember the conversation?
    Summary,
    /// How does the agent answer a private message?
    Chat,
}

impl PromptKind {
    /// Name of the user-message template.
    pub const fn template_name(self) -> &'static str {
        match self {
            Self::Decide => "decide",
            Self::Turn => "turn",
            Self::Summary => "summary",
            Self::Chat => "chat",
        }
    }
}

/// The complete rendered prompt ready to send to an LLM backend.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// System message fixing the role-play frame and JSON-only output.
    pub system: String,
    /// User message carrying the question and its context.
    pub user: String,
}

/// Manages prompt template loading and rendering.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Create a prompt engine with the built-in templates only.
    pub fn builtin() -> Result<Self, ReasonerError> {
        let mut env = Environment::new();
        for (name, _, source) in BUILTIN_TEMPLATES {
            env.add_template(name, source)
                .map_err(|e| ReasonerError::Template(format!("failed to add {name} template: {e}")))?;
        }
        Ok(Self { env })
    }

    /// Create a prompt engine preferring templates found in `dir`.
    pub fn from_dir(dir: &str) -> Result<Self, ReasonerError> {
        let mut env = Environment::new();
        for (name, file, source) in BUILTIN_TEMPLATES {
            let path = Path::new(dir).join(file);
            if path.is_file() {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    ReasonerError::Template(format!("failed to read {}: {e}", path.display()))
                })?;
                env.add_template_owned(name, text).map_err(|e| {
                    ReasonerError::Template(format!("failed to add {name} template: {e}"))
                })?;
            } else {
                env.add_template(name, source).map_err(|e| {
                    ReasonerError::Template(format!("failed to add {name} template: {e}"))
                })?;
            }
        }
        Ok(Self { env })
    }

    /// Render the system and user messages for `kind` from `context`.
    pub fn render<S: Serialize>(
        &self,
        kind: PromptKind,
        context: &S,
    ) -> Result<RenderedPrompt, ReasonerError> {
        let system = self.render_one("system", context)?;
        let user = self.render_one(kind.template_name(), context)?;
        Ok(RenderedPrompt { system, user })
    }

    fn render_one<S: Serialize>(&self, name: &str, context: &S) -> Result<String, ReasonerError> {
        self.env
            .get_template(name)
            .map_err(|e| ReasonerError::Template(format!("missing {name} template: {e}")))?
            .render(context)
            .map_err(|e| ReasonerError::Template(format!("{name} render failed: {e}")))
    }
}
