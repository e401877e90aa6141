//! Portable sequence document backed by Automerge.
//!
//! A [`SequenceDocument`] stores a graph (steps, connections, the id counter
//! and layout hints) so the caller can keep it in localStorage, a file or send
//! it elsewhere. Loading always re-validates the path invariant before a graph
//! is handed back.

use automerge::{AutoCommit, ScalarValue, Value};
use autosurgeon::reconcile::{MapReconciler, NoKey};
use autosurgeon::{hydrate, reconcile, Hydrate, HydrateError, ReadDoc, Reconcile, Reconciler};

use crate::error::{FieldIssue, FlowError, FlowResult};
use super::graph::SequenceGraph;
use super::model::{Connection, Step, StepContent};
use super::registry::{StepKind, BODY, MINUTES, RECIPIENT_EMAIL, SUBJECT};

// =============================================================================
// DOCUMENT ROOT
// =============================================================================

/// Root document structure for a stored sequence.
#[derive(Debug, Clone, Default, Reconcile, Hydrate, PartialEq)]
pub struct DocumentRoot {
    /// Next step id the graph will hand out.
    pub next_id: i64,

    /// Steps in creation order.
    pub steps: Vec<StepRecord>,

    pub connections: Vec<ConnectionRecord>,
}

impl DocumentRoot {
    /// Captures a graph.
    pub fn from_graph(graph: &SequenceGraph) -> Self {
        Self {
            next_id: graph.next_id() as i64,
            steps: graph.steps().iter().map(StepRecord::from).collect(),
            connections: graph.connections().iter().map(ConnectionRecord::from).collect(),
        }
    }

    /// Rebuilds and validates the graph.
    pub fn to_graph(&self) -> FlowResult<SequenceGraph> {
        let steps = self
            .steps
            .iter()
            .map(StepRecord::to_step)
            .collect::<FlowResult<Vec<_>>>()?;
        let connections = self.connections.iter().map(ConnectionRecord::to_connection).collect();
        let next_id = u64::try_from(self.next_id)
            .map_err(|_| FlowError::invariant(format!("negative next id {}", self.next_id)))?;
        SequenceGraph::from_parts(steps, connections, next_id)
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A stored step. Content is kept as a sparse field map and the layout hint
/// as a JSON string (empty when unset).
#[derive(Debug, Clone, Reconcile, Hydrate, PartialEq)]
pub struct StepRecord {
    pub id: String,
    pub kind: String,
    pub fields: ContentFields,
    pub layout: String,
}

impl From<&Step> for StepRecord {
    fn from(step: &Step) -> Self {
        let layout = if step.layout.is_null() {
            String::new()
        } else {
            step.layout.to_string()
        };
        Self {
            id: step.id.clone(),
            kind: step.kind().as_str().to_string(),
            fields: ContentFields::from(&step.content),
            layout,
        }
    }
}

impl StepRecord {
    /// Converts back to a typed step.
    pub fn to_step(&self) -> FlowResult<Step> {
        let kind: StepKind = self.kind.parse()?;
        let content = self.fields.to_content(kind)?;
        let layout = if self.layout.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&self.layout).map_err(|e| FlowError::serialization(e.to_string()))?
        };
        Ok(Step::new(self.id.clone(), content).with_layout(layout))
    }
}

/// A stored connection.
#[derive(Debug, Clone, Reconcile, Hydrate, PartialEq)]
pub struct ConnectionRecord {
    pub id: String,
    pub from: String,
    pub to: String,
}

impl From<&Connection> for ConnectionRecord {
    fn from(conn: &Connection) -> Self {
        Self {
            id: conn.id.clone(),
            from: conn.from.clone(),
            to: conn.to.clone(),
        }
    }
}

impl ConnectionRecord {
    /// Converts back to a connection, keeping the stored id.
    pub fn to_connection(&self) -> Connection {
        Connection {
            id: self.id.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

/// Content fields of every kind, only the ones used by a step's kind are set.
/// Note: Reconcile and Hydrate are implemented manually for sparse serialization.
/// - Reconcile: Only writes Some() fields, deletes None fields
/// - Hydrate: Treats missing keys as None (instead of erroring)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFields {
    pub recipient_email: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub minutes: Option<i64>,
}

impl From<&StepContent> for ContentFields {
    fn from(content: &StepContent) -> Self {
        match content {
            StepContent::LeadSource { recipient_email } => Self {
                recipient_email: Some(recipient_email.clone()),
                ..Self::default()
            },
            StepContent::ColdEmail { subject, body } => Self {
                subject: Some(subject.clone()),
                body: Some(body.clone()),
                ..Self::default()
            },
            StepContent::WaitDelay { minutes } => Self {
                minutes: Some(i64::from(*minutes)),
                ..Self::default()
            },
        }
    }
}

impl ContentFields {
    /// Builds typed content for `kind`, failing if a field it needs is absent.
    pub fn to_content(&self, kind: StepKind) -> FlowResult<StepContent> {
        fn require<T: Clone>(kind: StepKind, value: &Option<T>, field: &'static str) -> FlowResult<T> {
            value
                .clone()
                .ok_or_else(|| FlowError::validation(kind, vec![FieldIssue::missing(field)]))
        }

        match kind {
            StepKind::LeadSource => Ok(StepContent::lead_source(require(
                kind,
                &self.recipient_email,
                RECIPIENT_EMAIL,
            )?)),
            StepKind::ColdEmail => Ok(StepContent::cold_email(
                require(kind, &self.subject, SUBJECT)?,
                require(kind, &self.body, BODY)?,
            )),
            StepKind::WaitDelay => {
                let minutes = require(kind, &self.minutes, MINUTES)?;
                let minutes = u32::try_from(minutes).map_err(|_| {
                    FlowError::validation(kind, vec![FieldIssue::invalid(MINUTES, "is out of range")])
                })?;
                Ok(StepContent::wait_delay(minutes))
            }
        }
    }
}

impl Reconcile for ContentFields {
    type Key<'a> = NoKey;

    fn reconcile<R: Reconciler>(&self, mut reconciler: R) -> Result<(), R::Error> {
        let mut m = reconciler.map()?;

        // Helper: put if Some, delete if None (clears stale keys)
        macro_rules! reconcile_opt {
            ($field:expr, $key:literal) => {
                match $field {
                    Some(v) => m.put($key, v)?,
                    None => {
                        let _ = m.delete($key);
                    }
                }
            };
        }

        reconcile_opt!(&self.recipient_email, "recipient_email");
        reconcile_opt!(&self.subject, "subject");
        reconcile_opt!(&self.body, "body");
        reconcile_opt!(self.minutes, "minutes");

        Ok(())
    }
}

impl Hydrate for ContentFields {
    fn hydrate_map<D: ReadDoc>(doc: &D, obj: &automerge::ObjId) -> Result<Self, HydrateError> {
        fn hydrate_opt_i64<D: ReadDoc>(
            doc: &D,
            obj: &automerge::ObjId,
            key: &str,
        ) -> Result<Option<i64>, HydrateError> {
            match doc.get(obj, key)? {
                None => Ok(None),
                Some((Value::Scalar(s), _)) => match s.as_ref() {
                    ScalarValue::Int(i) => Ok(Some(*i)),
                    ScalarValue::Uint(u) => Ok(Some(*u as i64)),
                    _ => Ok(None),
                },
                _ => Ok(None),
            }
        }

        fn hydrate_opt_string<D: ReadDoc>(
            doc: &D,
            obj: &automerge::ObjId,
            key: &str,
        ) -> Result<Option<String>, HydrateError> {
            match doc.get(obj, key)? {
                None => Ok(None),
                Some((Value::Scalar(s), _)) => match s.as_ref() {
                    ScalarValue::Str(st) => Ok(Some(st.to_string())),
                    _ => Ok(None),
                },
                _ => Ok(None),
            }
        }

        Ok(ContentFields {
            recipient_email: hydrate_opt_string(doc, obj, "recipient_email")?,
            subject: hydrate_opt_string(doc, obj, "subject")?,
            body: hydrate_opt_string(doc, obj, "body")?,
            minutes: hydrate_opt_i64(doc, obj, "minutes")?,
        })
    }
}

// =============================================================================
// SEQUENCE DOCUMENT
// =============================================================================

/// Automerge document holding one sequence.
pub struct SequenceDocument {
    doc: AutoCommit,
    /// Cached hydrated state - invalidated after direct document mutations.
    cached_state: Option<DocumentRoot>,
}

impl SequenceDocument {
    /// Creates a document holding `graph`.
    pub fn from_graph(graph: &SequenceGraph) -> FlowResult<Self> {
        let mut doc = AutoCommit::new();
        let root = DocumentRoot::from_graph(graph);
        reconcile(&mut doc, &root)?;
        Ok(Self {
            doc,
            cached_state: Some(root),
        })
    }

    /// Creates a SequenceDocument from saved binary data.
    pub fn from_bytes(bytes: &[u8]) -> FlowResult<Self> {
        let doc = AutoCommit::load(bytes)?;
        Ok(Self {
            doc,
            cached_state: None,
        })
    }

    /// Saves the document to binary format.
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Hydrates the stored state.
    pub fn get_state(&mut self) -> FlowResult<DocumentRoot> {
        if let Some(ref cached) = self.cached_state {
            return Ok(cached.clone());
        }
        let state: DocumentRoot = hydrate(&self.doc)?;
        self.cached_state = Some(state.clone());
        Ok(state)
    }

    /// Applies a function to mutate the state, then reconciles back to the document.
    pub fn update_state<F>(&mut self, f: F) -> FlowResult<()>
    where
        F: FnOnce(&mut DocumentRoot),
    {
        let mut state = self.get_state()?;
        f(&mut state);
        reconcile(&mut self.doc, &state)?;
        self.cached_state = Some(state);
        Ok(())
    }

    /// Replaces the stored sequence with `graph`.
    pub fn store(&mut self, graph: &SequenceGraph) -> FlowResult<()> {
        let root = DocumentRoot::from_graph(graph);
        self.update_state(|state| *state = root)
    }

    /// Rebuilds the stored graph, rejecting anything that is not a simple path.
    pub fn to_graph(&mut self) -> FlowResult<SequenceGraph> {
        self.get_state()?.to_graph()
    }
}

// =============================================================================
// TESTS
// =============================================================================
