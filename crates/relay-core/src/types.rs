//! Core types shared by the gateway and the relay daemon.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// End-user identifier of the chat front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse status reported by the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Creating,
    Running,
    Completed,
    Failed,
    Expired,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Creating => "CREATING",
            AgentStatus::Running => "RUNNING",
            AgentStatus::Completed => "COMPLETED",
            AgentStatus::Failed => "FAILED",
            AgentStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Expired
        )
    }

    /// True while the remote system is still working on the latest instruction.
    pub fn is_in_progress(self) -> bool {
        matches!(self, AgentStatus::Creating | AgentStatus::Running)
    }

    /// Maps a raw remote status string. Returns `None` for unknown values so
    /// the caller decides how to log and default them.
    pub fn from_remote(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "FINISHED" | "COMPLETED" => Some(AgentStatus::Completed),
            "FAILED" | "ERROR" | "FAILURE" => Some(AgentStatus::Failed),
            "EXPIRED" => Some(AgentStatus::Expired),
            "CREATING" => Some(AgentStatus::Creating),
            "RUNNING" => Some(AgentStatus::Running),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub status: AgentStatus,
    /// Joined assistant output, only present when completed.
    pub output: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "user_message")]
    User,
    #[serde(rename = "assistant_message")]
    Assistant,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub text: String,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Assistant,
            text: text.into(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.kind == MessageKind::Assistant
    }
}

pub fn assistant_texts(messages: &[ConversationMessage]) -> Vec<&str> {
    messages
        .iter()
        .filter(|message| message.is_assistant())
        .map(|message| message.text.as_str())
        .collect()
}

pub fn assistant_count(messages: &[ConversationMessage]) -> usize {
    messages.iter().filter(|message| message.is_assistant()).count()
}

/// Joins assistant texts with a blank line. A single text is returned as-is.
pub fn join_assistant_texts(texts: &[&str]) -> Option<String> {
    match texts {
        [] => None,
        [only] => Some((*only).to_string()),
        many => Some(many.join("\n\n")),
    }
}

/// A repository the caller may direct agents at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub owner: String,
    pub name: String,
    #[serde(rename = "repository")]
    pub reference: String,
}

impl TargetDescriptor {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            reference: reference.into(),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Entry of the remote agent listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Plan,
    Ask,
    CodeGenerate,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Plan => "plan",
            ActionKind::Ask => "ask",
            ActionKind::CodeGenerate => "code_generate",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            ActionKind::Plan => "Create a solution plan for the following task:",
            ActionKind::Ask => "Formulate clarifying questions for the following task:",
            ActionKind::CodeGenerate => "Write the code for the following task:",
        }
    }

    pub fn apply_to(self, prompt: &str) -> String {
        format!("{}\n\n{}", self.instruction(), prompt)
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "plan" => Ok(ActionKind::Plan),
            "ask" => Ok(ActionKind::Ask),
            "code" | "solve" | "code_generate" => Ok(ActionKind::CodeGenerate),
            other => Err(format!(
                "invalid action '{other}'. valid values: plan, ask, code"
            )),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the prompt sent to the remote system for an optional action.
pub fn compose_prompt(text: &str, action: Option<ActionKind>) -> String {
    match action {
        Some(action) => action.apply_to(text),
        None => text.to_string(),
    }
}
