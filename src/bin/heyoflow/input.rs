//! Plan file structs for the CLI.
//!
//! A plan is an ordered list of editing intents, replayed through the session
//! controller exactly as a user would perform them:
//!
//! ```json
//! {
//!   "intents": [
//!     { "action": "add", "kind": "LeadSource", "fields": { "recipient_email": "a@b.com" } },
//!     { "action": "add", "kind": "ColdEmail", "fields": { "subject": "Hi", "body": "Hello" } },
//!     { "action": "edit", "id": "2", "fields": { "subject": "Hi again", "body": "Hello" } },
//!     { "action": "delete", "id": "2" }
//!   ]
//! }
//! ```

use heyoflow::FormFields;
use serde::Deserialize;

/// Root plan structure.
#[derive(Debug, Deserialize)]
pub struct InputPlan {
    pub intents: Vec<Intent>,
}

/// One editing intent.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Intent {
    Add {
        kind: String,
        #[serde(default)]
        fields: FormFields,
    },
    Edit {
        id: String,
        /// Optional new kind; keeps the step's kind when omitted.
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        fields: FormFields,
    },
    Delete {
        id: String,
    },
    Layout {
        id: String,
        layout: serde_json::Value,
    },
}
