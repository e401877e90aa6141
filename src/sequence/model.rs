//! Data models for the sequence graph.

use serde::{Deserialize, Serialize};

use super::registry::StepKind;

// =============================================================================
// STEP CONTENT
// =============================================================================

/// Kind-specific payload of a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "content")]
pub enum StepContent {
    #[serde(rename_all = "camelCase")]
    LeadSource { recipient_email: String },

    ColdEmail { subject: String, body: String },

    WaitDelay { minutes: u32 },
}

impl StepContent {
    /// Creates LeadSource content.
    pub fn lead_source(recipient_email: impl Into<String>) -> Self {
        Self::LeadSource {
            recipient_email: recipient_email.into(),
        }
    }

    /// Creates ColdEmail content.
    pub fn cold_email(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::ColdEmail {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Creates WaitDelay content.
    pub fn wait_delay(minutes: u32) -> Self {
        Self::WaitDelay { minutes }
    }

    /// The kind this content belongs to.
    pub fn kind(&self) -> StepKind {
        match self {
            Self::LeadSource { .. } => StepKind::LeadSource,
            Self::ColdEmail { .. } => StepKind::ColdEmail,
            Self::WaitDelay { .. } => StepKind::WaitDelay,
        }
    }
}

// =============================================================================
// STEP
// =============================================================================

/// One node of the outreach sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Assigned by the graph counter, never reused.
    pub id: String,

    /// Kind tag and payload, serialized as `kind` + `content`.
    #[serde(flatten)]
    pub content: StepContent,

    /// Opaque positioning data owned by the presentation layer.
    #[serde(default)]
    pub layout: serde_json::Value,
}

impl Step {
    /// Creates a step with an empty layout hint.
    pub fn new(id: impl Into<String>, content: StepContent) -> Self {
        Self {
            id: id.into(),
            content,
            layout: serde_json::Value::Null,
        }
    }

    /// Builder: Set layout hint.
    pub fn with_layout(mut self, layout: serde_json::Value) -> Self {
        self.layout = layout;
        self
    }

    /// Returns the step's kind.
    pub fn kind(&self) -> StepKind {
        self.content.kind()
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Directed "executes after" edge between two steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Connection {
    pub id: String,
    pub from: String,
    pub to: String,
}

impl Connection {
    /// Creates a connection whose id is derived from the two step ids it joins.
    ///
    /// A simple path never holds two edges with the same endpoints, so the id
    /// is unique among live connections.
    pub fn between(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: format!("e{}-{}", from, to),
            from,
            to,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Immutable copy of the graph's steps (creation order) and connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub steps: Vec<Step>,
    pub connections: Vec<Connection>,
}

// =============================================================================
// TESTS
// =============================================================================
