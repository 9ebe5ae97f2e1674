//! JSON shapes of the remote agent API.

use relay_core::types::{AgentId, AgentSummary, ConversationMessage, TargetDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptBody {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceBody {
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateAgentBody {
    pub prompt: PromptBody,
    pub source: SourceBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CreateAgentBody {
    pub fn new(prompt: &str, repository: &str, model: Option<&str>) -> Self {
        Self {
            prompt: PromptBody {
                text: prompt.to_string(),
            },
            source: SourceBody {
                repository: repository.to_string(),
            },
            model: model
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowupBody {
    pub prompt: PromptBody,
}

impl FollowupBody {
    pub fn new(text: &str) -> Self {
        Self {
            prompt: PromptBody {
                text: text.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatedAgentBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "agentId")]
    pub agent_id: Option<String>,
}

impl CreatedAgentBody {
    pub fn resolved_id(&self) -> Option<AgentId> {
        self.id
            .as_deref()
            .or(self.agent_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(AgentId::new)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentStatusBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "errorMessage")]
    pub error_message_camel: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl AgentStatusBody {
    pub fn raw_status(&self) -> &str {
        self.status.as_deref().unwrap_or("unknown")
    }

    /// First present error field, in the order the remote API has used them.
    pub fn error_text(&self) -> Option<String> {
        self.error
            .clone()
            .or_else(|| self.error_message_camel.clone())
            .or_else(|| self.error_message.clone())
            .or_else(|| {
                self.data
                    .as_ref()
                    .and_then(|data| data.get("error"))
                    .and_then(|error| error.as_str())
                    .map(str::to_string)
            })
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConversationBody {
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepositoriesBody {
    #[serde(default)]
    pub repositories: Vec<TargetDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentListEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgentsBody {
    #[serde(default)]
    pub agents: Vec<AgentListEntry>,
}

impl From<AgentListEntry> for AgentSummary {
    fn from(entry: AgentListEntry) -> Self {
        AgentSummary {
            id: AgentId::new(entry.id),
            name: entry
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "untitled".to_string()),
            status: entry
                .status
                .unwrap_or_else(|| "UNKNOWN".to_string())
                .to_ascii_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentStatusBody, AgentsBody, CreateAgentBody, CreatedAgentBody};
    use relay_core::types::AgentSummary;

    #[test]
    fn create_body_omits_blank_model() {
        let body = CreateAgentBody::new("do X", "https://github.com/acme/api", Some("  "));
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["prompt"]["text"], "do X");
        assert_eq!(json["source"]["repository"], "https://github.com/acme/api");
        assert!(json.get("model").is_none());

        let with_model = CreateAgentBody::new("do X", "r", Some("gpt-5"));
        let json = serde_json::to_value(&with_model).expect("serialize");
        assert_eq!(json["model"], "gpt-5");
    }

    #[test]
    fn created_id_falls_back_to_agent_id_field() {
        let body: CreatedAgentBody =
            serde_json::from_str(r#"{"agentId": "bc-42"}"#).expect("parse");
        assert_eq!(body.resolved_id().map(|id| id.0), Some("bc-42".to_string()));

        let empty: CreatedAgentBody = serde_json::from_str(r#"{"id": ""}"#).expect("parse");
        assert_eq!(empty.resolved_id(), None);
    }

    #[test]
    fn error_text_checks_fields_in_order() {
        let body: AgentStatusBody =
            serde_json::from_str(r#"{"status": "FAILED", "data": {"error": "disk full"}}"#)
                .expect("parse");
        assert_eq!(body.error_text().as_deref(), Some("disk full"));

        let body: AgentStatusBody = serde_json::from_str(
            r#"{"status": "FAILED", "errorMessage": "camel", "error_message": "snake"}"#,
        )
        .expect("parse");
        assert_eq!(body.error_text().as_deref(), Some("camel"));

        let body: AgentStatusBody = serde_json::from_str(r#"{}"#).expect("parse");
        assert_eq!(body.raw_status(), "unknown");
        assert_eq!(body.error_text(), None);
    }

    #[test]
    fn agent_listing_fills_missing_fields() {
        let body: AgentsBody = serde_json::from_str(
            r#"{"agents": [{"id": "a1", "name": "Fix login", "status": "finished"}, {"id": "a2"}]}"#,
        )
        .expect("parse");
        let summaries: Vec<AgentSummary> = body.agents.into_iter().map(Into::into).collect();
        assert_eq!(summaries[0].status, "FINISHED");
        assert_eq!(summaries[1].name, "untitled");
        assert_eq!(summaries[1].status, "UNKNOWN");
    }
}
