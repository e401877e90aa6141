//! Text form of step content and parsing of submitted form fields.
//!
//! The canonical text form is two lines:
//!
//! ```text
//! WaitDelay
//! - (60 min)
//! ```
//!
//! The second line is `- (<email>)` for a lead source, `- (<n> min)` for a
//! wait, and `- (<subject>) <body>` for a cold email. A cold email subject that
//! contains `) ` cannot be split back out of that form; such content is
//! encoded as-is and reported by [`has_reserved_delimiters`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FieldIssue, FlowError, FlowResult};
use super::model::StepContent;
use super::registry::{self, FieldType, StepKind, BODY, MINUTES, RECIPIENT_EMAIL, SUBJECT};

const OPEN: &str = "- (";
const CLOSE: char = ')';
const SPLIT: &str = ") ";

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Encodes content into its canonical two-line text form.
pub fn encode(content: &StepContent) -> String {
    if has_reserved_delimiters(content) {
        tracing::warn!(
            kind = %content.kind(),
            "step content contains a reserved delimiter; its text form will not decode losslessly"
        );
    }
    let detail = match content {
        StepContent::LeadSource { recipient_email } => format!("{}{}{}", OPEN, recipient_email, CLOSE),
        StepContent::ColdEmail { subject, body } => format!("{}{}{}{}", OPEN, subject, SPLIT, body),
        StepContent::WaitDelay { minutes } => format!("{}{} min{}", OPEN, minutes, CLOSE),
    };
    format!("{}\n{}", content.kind(), detail)
}

/// Decodes text produced by [`encode`] back into content of `kind`.
pub fn decode(kind: StepKind, text: &str) -> FlowResult<StepContent> {
    let (name, detail) = text
        .split_once('\n')
        .ok_or_else(|| malformed(kind, "expected two lines"))?;

    match StepKind::from_name(name) {
        Some(found) if found == kind => {}
        _ => return Err(malformed(kind, format!("first line names '{}'", name.trim()))),
    }

    let rest = detail
        .strip_prefix(OPEN)
        .ok_or_else(|| malformed(kind, format!("second line must start with '{}'", OPEN)))?;

    match kind {
        StepKind::LeadSource => {
            let email = strip_close(kind, rest)?;
            Ok(StepContent::lead_source(email))
        }
        StepKind::ColdEmail => {
            let (subject, body) = rest
                .split_once(SPLIT)
                .ok_or_else(|| malformed(kind, "missing subject terminator"))?;
            Ok(StepContent::cold_email(subject, body))
        }
        StepKind::WaitDelay => {
            let inner = strip_close(kind, rest)?;
            let minutes = parse_minutes(inner)
                .ok_or_else(|| malformed(kind, format!("'{}' is not a duration", inner)))?;
            Ok(StepContent::wait_delay(minutes))
        }
    }
}

/// True when the content contains a substring that the text form uses as a
/// delimiter, so `decode(encode(content))` is not guaranteed to return it.
pub fn has_reserved_delimiters(content: &StepContent) -> bool {
    match content {
        StepContent::ColdEmail { subject, body } => {
            subject.contains(SPLIT) || subject.contains(OPEN) || body.contains(OPEN)
        }
        StepContent::LeadSource { recipient_email } => recipient_email.contains(OPEN),
        StepContent::WaitDelay { .. } => false,
    }
}

fn strip_close(kind: StepKind, rest: &str) -> FlowResult<&str> {
    rest.strip_suffix(CLOSE)
        .ok_or_else(|| malformed(kind, format!("second line must end with '{}'", CLOSE)))
}

fn malformed(kind: StepKind, problem: impl Into<String>) -> FlowError {
    FlowError::validation(kind, vec![FieldIssue::invalid("text", problem)])
}

/// Accepts `"60"`, `"60 min"` and `"60 minutes"`.
fn parse_minutes(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let number = raw
        .strip_suffix("minutes")
        .or_else(|| raw.strip_suffix("min"))
        .unwrap_or(raw)
        .trim();
    number.parse().ok()
}

// =============================================================================
// FORM FIELDS
// =============================================================================

/// Raw values submitted by a step form, keyed by schema field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FormFields(BTreeMap<String, String>);

impl FormFields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: Set a field value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a field value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Gets a field value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if no fields are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Field values to pre-fill an empty form for `kind`, taken from schema defaults.
pub fn default_fields(kind: StepKind) -> FormFields {
    let mut fields = FormFields::new();
    for spec in registry::schema(kind).fields {
        fields.insert(spec.name, spec.default.unwrap_or_default());
    }
    fields
}

/// Field values that reproduce `content` when submitted.
pub fn fields_from_content(content: &StepContent) -> FormFields {
    match content {
        StepContent::LeadSource { recipient_email } => {
            FormFields::new().with(RECIPIENT_EMAIL, recipient_email.as_str())
        }
        StepContent::ColdEmail { subject, body } => FormFields::new()
            .with(SUBJECT, subject.as_str())
            .with(BODY, body.as_str()),
        StepContent::WaitDelay { minutes } => FormFields::new().with(MINUTES, format!("{} min", minutes)),
    }
}

/// Parses submitted form fields into typed content for `kind`.
///
/// Blank fields fall back to the schema default. Every missing or unparsable
/// field is reported in a single Validation error, and the resulting content
/// is checked against the registry before it is returned.
pub fn content_from_fields(kind: StepKind, fields: &FormFields) -> FlowResult<StepContent> {
    let schema = registry::schema(kind);
    let mut issues = Vec::new();
    let mut values: BTreeMap<&'static str, String> = BTreeMap::new();
    let mut minutes = 0u32;

    for spec in schema.fields {
        let raw = fields
            .get(spec.name)
            .filter(|v| !v.trim().is_empty())
            .or(spec.default);
        let Some(raw) = raw else {
            if spec.required {
                issues.push(FieldIssue::missing(spec.name));
            }
            continue;
        };
        match spec.field_type {
            FieldType::Minutes => match parse_minutes(raw) {
                Some(n) => minutes = n,
                None => issues.push(FieldIssue::invalid(spec.name, format!("'{}' is not a whole number of minutes", raw))),
            },
            FieldType::Email | FieldType::Text => {
                values.insert(spec.name, raw.trim().to_string());
            }
            // Body text keeps its own whitespace.
            FieldType::LongText => {
                values.insert(spec.name, raw.to_string());
            }
        }
    }

    if !issues.is_empty() {
        return Err(FlowError::validation(kind, issues));
    }

    let mut take = |name: &str| values.remove(name).unwrap_or_default();
    let content = match kind {
        StepKind::LeadSource => StepContent::lead_source(take(RECIPIENT_EMAIL)),
        StepKind::ColdEmail => StepContent::cold_email(take(SUBJECT), take(BODY)),
        StepKind::WaitDelay => StepContent::wait_delay(minutes),
    };
    registry::validate(kind, &content)?;
    Ok(content)
}

// =============================================================================
// TESTS
// =============================================================================
