//! The fixed set of step kinds and the content schema each one accepts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FieldIssue, FlowError, FlowResult};
use super::model::StepContent;

// =============================================================================
// STEP KIND
// =============================================================================

/// The kind of a step. Closed set; not user-extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    LeadSource,
    ColdEmail,
    WaitDelay,
}

impl StepKind {
    /// Every kind, in the order the add-step picker lists them.
    pub const ALL: [StepKind; 3] = [StepKind::LeadSource, StepKind::ColdEmail, StepKind::WaitDelay];

    /// Canonical name, used as the first line of the encoded text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::LeadSource => "LeadSource",
            StepKind::ColdEmail => "ColdEmail",
            StepKind::WaitDelay => "WaitDelay",
        }
    }

    /// Human label for headings and pickers.
    pub fn label(&self) -> &'static str {
        schema(*self).label
    }

    /// Parses a canonical name or one of the legacy hyphenated labels.
    pub fn from_name(name: &str) -> Option<StepKind> {
        match name.trim() {
            "LeadSource" | "Lead-Source" => Some(StepKind::LeadSource),
            "ColdEmail" | "Cold-Email" => Some(StepKind::ColdEmail),
            "WaitDelay" | "Wait/Delay" => Some(StepKind::WaitDelay),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::from_name(s).ok_or_else(|| FlowError::unknown_kind(s))
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// How a form field is rendered and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Single line of text.
    Text,
    /// Multi-line text area.
    LongText,
    /// Email address.
    Email,
    /// Whole number of minutes, at least one.
    Minutes,
}

/// One field of a step's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    /// Raw form value used when the field is left empty.
    pub default: Option<&'static str>,
}

/// The content schema of one step kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepSchema {
    pub kind: StepKind,
    pub label: &'static str,
    pub fields: &'static [FieldSpec],
}

impl StepSchema {
    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub const RECIPIENT_EMAIL: &str = "recipient_email";
pub const SUBJECT: &str = "subject";
pub const BODY: &str = "body";
pub const MINUTES: &str = "minutes";

static LEAD_SOURCE: StepSchema = StepSchema {
    kind: StepKind::LeadSource,
    label: "Lead Source",
    fields: &[FieldSpec {
        name: RECIPIENT_EMAIL,
        label: "Recipient Email",
        field_type: FieldType::Email,
        required: true,
        default: None,
    }],
};

static COLD_EMAIL: StepSchema = StepSchema {
    kind: StepKind::ColdEmail,
    label: "Cold Email",
    fields: &[
        FieldSpec {
            name: SUBJECT,
            label: "Subject",
            field_type: FieldType::Text,
            required: true,
            default: None,
        },
        FieldSpec {
            name: BODY,
            label: "Email Content",
            field_type: FieldType::LongText,
            required: true,
            default: None,
        },
    ],
};

static WAIT_DELAY: StepSchema = StepSchema {
    kind: StepKind::WaitDelay,
    label: "Wait/Delay",
    fields: &[FieldSpec {
        name: MINUTES,
        label: "Wait Duration",
        field_type: FieldType::Minutes,
        required: true,
        default: Some("1 min"),
    }],
};

/// Returns the schema for a kind.
pub fn schema(kind: StepKind) -> &'static StepSchema {
    match kind {
        StepKind::LeadSource => &LEAD_SOURCE,
        StepKind::ColdEmail => &COLD_EMAIL,
        StepKind::WaitDelay => &WAIT_DELAY,
    }
}

/// A wait duration offered by the form picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitPreset {
    pub minutes: u32,
    pub label: &'static str,
}

/// Durations offered by the wait picker. Any whole number of minutes is valid;
/// these are only the suggested values.
pub const WAIT_PRESETS: &[WaitPreset] = &[
    WaitPreset { minutes: 1, label: "1 minute" },
    WaitPreset { minutes: 2, label: "2 minutes" },
    WaitPreset { minutes: 3, label: "3 minutes" },
    WaitPreset { minutes: 4, label: "4 minutes" },
    WaitPreset { minutes: 5, label: "5 minutes" },
    WaitPreset { minutes: 6, label: "6 minutes" },
    WaitPreset { minutes: 7, label: "7 minutes" },
    WaitPreset { minutes: 8, label: "8 minutes" },
    WaitPreset { minutes: 9, label: "9 minutes" },
    WaitPreset { minutes: 10, label: "10 minutes" },
    WaitPreset { minutes: 60, label: "1 hour" },
    WaitPreset { minutes: 120, label: "2 hours" },
    WaitPreset { minutes: 1440, label: "1 day" },
    WaitPreset { minutes: 2880, label: "2 days" },
    WaitPreset { minutes: 4320, label: "3 days" },
];

// =============================================================================
// VALIDATION
// =============================================================================

/// Checks typed content against the schema of `kind`.
///
/// Every problem is collected so the caller can report all of them at once.
pub fn validate(kind: StepKind, content: &StepContent) -> FlowResult<()> {
    if content.kind() != kind {
        return Err(FlowError::validation(
            kind,
            vec![FieldIssue::invalid(
                "kind",
                format!("expected {} content, got {}", kind, content.kind()),
            )],
        ));
    }

    let mut issues = Vec::new();
    match content {
        StepContent::LeadSource { recipient_email } => {
            if let Some(issue) = check_email(recipient_email) {
                issues.push(issue);
            }
        }
        StepContent::ColdEmail { subject, body } => {
            if subject.trim().is_empty() {
                issues.push(FieldIssue::missing(SUBJECT));
            } else if subject.contains('\n') {
                issues.push(FieldIssue::invalid(SUBJECT, "must be a single line"));
            }
            if body.trim().is_empty() {
                issues.push(FieldIssue::missing(BODY));
            }
        }
        StepContent::WaitDelay { minutes } => {
            if *minutes < 1 {
                issues.push(FieldIssue::invalid(MINUTES, "must be at least 1"));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(FlowError::validation(kind, issues))
    }
}

/// Minimal shape check: `local@domain` with no whitespace and no line breaks.
fn check_email(email: &str) -> Option<FieldIssue> {
    if email.trim().is_empty() {
        return Some(FieldIssue::missing(RECIPIENT_EMAIL));
    }
    if email.chars().any(char::is_whitespace) {
        return Some(FieldIssue::invalid(RECIPIENT_EMAIL, "must not contain whitespace"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => None,
        _ => Some(FieldIssue::invalid(RECIPIENT_EMAIL, "is not an email address")),
    }
}

// =============================================================================
// TESTS
// =============================================================================
