//! One-at-a-time editing sessions over a [`SequenceGraph`].
//!
//! ```text
//! Idle --begin_add/begin_edit--> Composing --submit--> Submitting --> Idle
//!   \                                \--cancel--> Idle
//!    \--begin_export--> Exporting --finish_export--> Idle
//! ```
//!
//! Only one session can be open. Every structural change goes through the
//! controller so that nothing mutates the graph while a form is open for a
//! different transaction or while the graph is being exported.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};
use crate::export::{ExportPayload, ProcessStarter};
use super::codec::{self, FormFields};
use super::graph::SequenceGraph;
use super::model::{GraphSnapshot, Step, StepContent};
use super::registry::StepKind;

/// An open create or edit form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Composition {
    /// Fresh per session; lets callers discard stale form submissions.
    pub session_id: Uuid,
    pub kind: StepKind,
    /// Step being edited, or `None` when adding a new step.
    pub target: Option<String>,
}

impl Composition {
    /// Returns true if this session edits an existing step.
    pub fn is_edit(&self) -> bool {
        self.target.is_some()
    }
}

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Composing(Composition),
    Submitting,
    Exporting,
}

impl SessionState {
    /// Short lowercase name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Composing(_) => "composing",
            SessionState::Submitting => "submitting",
            SessionState::Exporting => "exporting",
        }
    }
}

/// Orchestrates editing sessions and owns the graph they mutate.
#[derive(Debug, Clone)]
pub struct SessionController {
    graph: SequenceGraph,
    state: SessionState,
}

impl SessionController {
    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Creates a controller over an empty graph.
    pub fn new() -> Self {
        Self::with_graph(SequenceGraph::new())
    }

    /// Creates a controller over an existing graph.
    pub fn with_graph(graph: SequenceGraph) -> Self {
        Self {
            graph,
            state: SessionState::Idle,
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// The graph being edited.
    pub fn graph(&self) -> &SequenceGraph {
        &self.graph
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns true if no session or export is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    /// The open form, if any.
    pub fn composition(&self) -> Option<&Composition> {
        match &self.state {
            SessionState::Composing(c) => Some(c),
            _ => None,
        }
    }

    /// Immutable copy of the current steps and connections.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    /// Whether the open edit session may offer deletion of its target.
    pub fn can_delete_target(&self) -> bool {
        match self.composition().and_then(|c| c.target.as_deref()) {
            Some(id) => self.graph.can_delete(id),
            None => false,
        }
    }

    /// Whether deleting the open edit target would leave a non-LeadSource at
    /// the head, so the form can warn before the delete.
    pub fn target_exposes_non_lead_head(&self) -> bool {
        match self.composition().and_then(|c| c.target.as_deref()) {
            Some(id) => self.graph.exposes_non_lead_head(id),
            None => false,
        }
    }

    fn ensure_idle(&self) -> FlowResult<()> {
        match &self.state {
            SessionState::Idle => Ok(()),
            other => Err(FlowError::reentrancy(other.name())),
        }
    }

    fn current_composition(&self) -> FlowResult<Composition> {
        match &self.state {
            SessionState::Composing(c) => Ok(c.clone()),
            SessionState::Idle => Err(FlowError::NoActiveSession),
            other => Err(FlowError::reentrancy(other.name())),
        }
    }

    // =========================================================================
    // OPENING AND CLOSING SESSIONS
    // =========================================================================

    /// Opens a LeadSource form if the graph is empty and nothing else is open.
    ///
    /// Returns `None` when the graph already has steps.
    pub fn bootstrap(&mut self) -> FlowResult<Option<Composition>> {
        if !self.graph.is_empty() {
            return Ok(None);
        }
        self.begin_add(StepKind::LeadSource).map(Some)
    }

    /// Opens a form for a new step. On an empty graph the kind is always
    /// LeadSource, whatever was requested.
    pub fn begin_add(&mut self, kind: StepKind) -> FlowResult<Composition> {
        self.ensure_idle()?;
        let kind = if self.graph.is_empty() {
            StepKind::LeadSource
        } else {
            kind
        };
        Ok(self.open(kind, None))
    }

    /// Opens a form for an existing step.
    pub fn begin_edit(&mut self, id: &str) -> FlowResult<Composition> {
        self.ensure_idle()?;
        let kind = self
            .graph
            .get(id)
            .map(Step::kind)
            .ok_or_else(|| FlowError::not_found(id))?;
        Ok(self.open(kind, Some(id.to_string())))
    }

    fn open(&mut self, kind: StepKind, target: Option<String>) -> Composition {
        let composition = Composition {
            session_id: Uuid::new_v4(),
            kind,
            target,
        };
        tracing::debug!(
            session = %composition.session_id,
            kind = %kind,
            target = composition.target.as_deref(),
            "opened session"
        );
        self.state = SessionState::Composing(composition.clone());
        composition
    }

    /// Switches the kind of the open form.
    pub fn change_kind(&mut self, kind: StepKind) -> FlowResult<Composition> {
        let mut composition = self.current_composition()?;
        if composition.target.is_none() && self.graph.is_empty() && kind != StepKind::LeadSource {
            return Err(FlowError::invariant("the first step must be a LeadSource"));
        }
        composition.kind = kind;
        self.state = SessionState::Composing(composition.clone());
        Ok(composition)
    }

    /// Closes the open form without touching the graph.
    pub fn cancel(&mut self) -> FlowResult<()> {
        match &self.state {
            SessionState::Composing(c) => {
                tracing::debug!(session = %c.session_id, "cancelled session");
                self.state = SessionState::Idle;
                Ok(())
            }
            SessionState::Idle => Ok(()),
            other => Err(FlowError::reentrancy(other.name())),
        }
    }

    /// Values to pre-fill the open form with.
    ///
    /// Edits decode the target's text form when the kind is unchanged; new
    /// steps and kind changes get the schema defaults.
    pub fn form_defaults(&self) -> FlowResult<FormFields> {
        let composition = self.current_composition()?;
        let Some(id) = composition.target.as_deref() else {
            return Ok(codec::default_fields(composition.kind));
        };
        let step = self.graph.get(id).ok_or_else(|| FlowError::not_found(id))?;
        let fields = match codec::decode(composition.kind, &codec::encode(&step.content)) {
            Ok(content) => codec::fields_from_content(&content),
            Err(_) => codec::default_fields(composition.kind),
        };
        Ok(fields)
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Applies the open form: adds a step, or edits the target.
    ///
    /// Validation and invariant failures leave the form open so the user can
    /// correct it. A missing target means the session is stale and it is
    /// closed.
    pub fn submit(&mut self, fields: &FormFields) -> FlowResult<Step> {
        let composition = self.current_composition()?;
        self.state = SessionState::Submitting;

        let result = codec::content_from_fields(composition.kind, fields).and_then(|content| {
            match composition.target.as_deref() {
                None => self.graph.add_step(composition.kind, content),
                Some(id) => self.graph.edit_step(id, composition.kind, content),
            }
        });
        self.settle(composition, &result);
        result
    }

    /// Deletes the target of the open edit form.
    pub fn submit_delete(&mut self) -> FlowResult<Step> {
        let composition = self.current_composition()?;
        let Some(id) = composition.target.clone() else {
            return Err(FlowError::invariant("an add session has no step to delete"));
        };
        self.state = SessionState::Submitting;

        let result = self.graph.delete_step(&id);
        self.settle(composition, &result);
        result
    }

    fn settle<T>(&mut self, composition: Composition, result: &FlowResult<T>) {
        self.state = match result {
            Ok(_) | Err(FlowError::NotFound(_)) => SessionState::Idle,
            Err(_) => SessionState::Composing(composition.clone()),
        };
        match result {
            Ok(_) => tracing::debug!(session = %composition.session_id, "session submitted"),
            Err(e) => tracing::debug!(session = %composition.session_id, error = %e, "session submit failed"),
        }
    }

    // =========================================================================
    // ONE-SHOT OPERATIONS
    // =========================================================================

    fn transact<T>(&mut self, op: impl FnOnce(&mut SequenceGraph) -> FlowResult<T>) -> FlowResult<T> {
        self.ensure_idle()?;
        self.state = SessionState::Submitting;
        let result = op(&mut self.graph);
        self.state = SessionState::Idle;
        result
    }

    /// Adds a step with typed content in a single transaction.
    ///
    /// The first step of an empty graph must be a LeadSource.
    pub fn add_step(&mut self, kind: StepKind, content: StepContent) -> FlowResult<Step> {
        self.transact(|graph| {
            if graph.is_empty() && kind != StepKind::LeadSource {
                return Err(FlowError::invariant("the first step must be a LeadSource"));
            }
            graph.add_step(kind, content)
        })
    }

    /// Edits a step with typed content in a single transaction.
    pub fn edit_step(&mut self, id: &str, kind: StepKind, content: StepContent) -> FlowResult<Step> {
        self.transact(|graph| graph.edit_step(id, kind, content))
    }

    /// Deletes a step in a single transaction.
    pub fn delete_step(&mut self, id: &str) -> FlowResult<Step> {
        self.transact(|graph| graph.delete_step(id))
    }

    /// Replaces a step's layout hint. Allowed in any state; layout is not
    /// structural.
    pub fn set_layout(&mut self, id: &str, layout: serde_json::Value) -> FlowResult<()> {
        self.graph.set_layout(id, layout)
    }

    // =========================================================================
    // EXPORT
    // =========================================================================

    /// Validates the graph, builds the export payload and enters `Exporting`.
    ///
    /// Until [`finish_export`](Self::finish_export) is called every session and
    /// structural operation is rejected.
    pub fn begin_export(&mut self) -> FlowResult<ExportPayload> {
        self.ensure_idle()?;
        let payload = ExportPayload::from_graph(&self.graph)?;
        self.state = SessionState::Exporting;
        tracing::info!(steps = payload.steps.len(), "exporting sequence");
        Ok(payload)
    }

    /// Leaves `Exporting`. A no-op in any other state.
    pub fn finish_export(&mut self) {
        if self.state == SessionState::Exporting {
            self.state = SessionState::Idle;
        }
    }

    /// Exports the graph through `starter`, reporting its failure verbatim.
    pub async fn export_with<S: ProcessStarter>(&mut self, starter: &S) -> FlowResult<()> {
        let payload = self.begin_export()?;
        let guard = ExportGuard(self);
        let outcome = starter.start_process(&payload).await;
        drop(guard);

        match outcome {
            Ok(()) => {
                tracing::info!("process started");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "process start failed");
                Err(e.into())
            }
        }
    }
}

/// Leaves `Exporting` when dropped, including when the export future is
/// dropped mid-flight by a caller-side timeout.
struct ExportGuard<'a>(&'a mut SessionController);

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_export();
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::registry::{BODY, MINUTES, RECIPIENT_EMAIL, SUBJECT};

    fn lead_fields() -> FormFields {
        FormFields::new().with(RECIPIENT_EMAIL, "a@b.com")
    }

    fn seeded() -> SessionController {
        let mut controller = SessionController::new();
        controller
            .add_step(StepKind::LeadSource, StepContent::lead_source("a@b.com"))
            .unwrap();
        controller
            .add_step(StepKind::ColdEmail, StepContent::cold_email("Hi", "Hello"))
            .unwrap();
        controller
            .add_step(StepKind::WaitDelay, StepContent::wait_delay(30))
            .unwrap();
        controller
    }

    #[test]
    fn test_starts_idle() {
        let controller = SessionController::new();
        assert!(controller.is_idle());
        assert!(controller.composition().is_none());
        assert_eq!(controller.state().name(), "idle");
    }

    #[test]
    fn test_bootstrap_opens_lead_source() {
        let mut controller = SessionController::new();
        let composition = controller.bootstrap().unwrap().unwrap();
        assert_eq!(composition.kind, StepKind::LeadSource);
        assert!(!composition.is_edit());

        let step = controller.submit(&lead_fields()).unwrap();
        assert_eq!(step.id, "1");
        assert!(controller.is_idle());
        assert!(controller.bootstrap().unwrap().is_none());
    }

    #[test]
    fn test_begin_add_on_empty_graph_is_lead_source() {
        let mut controller = SessionController::new();
        let composition = controller.begin_add(StepKind::ColdEmail).unwrap();
        assert_eq!(composition.kind, StepKind::LeadSource);
        assert!(controller.change_kind(StepKind::WaitDelay).is_err());
    }

    #[test]
    fn test_second_session_rejected() {
        let mut controller = seeded();
        controller.begin_add(StepKind::WaitDelay).unwrap();
        assert!(matches!(
            controller.begin_add(StepKind::ColdEmail),
            Err(FlowError::Reentrancy(_))
        ));
        assert!(matches!(controller.begin_edit("1"), Err(FlowError::Reentrancy(_))));
        assert!(matches!(
            controller.delete_step("2"),
            Err(FlowError::Reentrancy(_))
        ));
        assert_eq!(controller.graph().len(), 3);
    }

    #[test]
    fn test_sessions_get_fresh_ids() {
        let mut controller = seeded();
        let first = controller.begin_add(StepKind::WaitDelay).unwrap();
        controller.cancel().unwrap();
        let second = controller.begin_add(StepKind::WaitDelay).unwrap();
        assert_ne!(first.session_id, second.session_id);
    }

    #[test]
    fn test_cancel_discards_form() {
        let mut controller = seeded();
        let before = controller.snapshot();
        controller.begin_edit("2").unwrap();
        controller.cancel().unwrap();
        assert!(controller.is_idle());
        assert_eq!(controller.snapshot(), before);
        assert!(controller.cancel().is_ok());
    }

    #[test]
    fn test_submit_add_appends() {
        let mut controller = seeded();
        controller.begin_add(StepKind::WaitDelay).unwrap();
        let step = controller
            .submit(&FormFields::new().with(MINUTES, "1440 min"))
            .unwrap();
        assert_eq!(step.content, StepContent::wait_delay(1440));
        assert_eq!(controller.graph().chain_ids(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_validation_failure_keeps_form_open() {
        let mut controller = seeded();
        let composition = controller.begin_add(StepKind::ColdEmail).unwrap();
        let err = controller
            .submit(&FormFields::new().with(SUBJECT, "Only a subject"))
            .unwrap_err();
        assert_eq!(err.issues()[0].field, BODY);
        assert_eq!(controller.composition(), Some(&composition));
        assert_eq!(controller.graph().len(), 3);

        controller
            .submit(&FormFields::new().with(SUBJECT, "Subject").with(BODY, "Body"))
            .unwrap();
        assert!(controller.is_idle());
    }

    #[test]
    fn test_edit_prefills_and_updates() {
        let mut controller = seeded();
        controller.begin_edit("2").unwrap();
        let defaults = controller.form_defaults().unwrap();
        assert_eq!(defaults.get(SUBJECT), Some("Hi"));
        assert_eq!(defaults.get(BODY), Some("Hello"));

        let fields = defaults.clone().with(BODY, "Hello again");
        let step = controller.submit(&fields).unwrap();
        assert_eq!(step.id, "2");
        assert_eq!(step.content, StepContent::cold_email("Hi", "Hello again"));
        assert_eq!(controller.graph().connections().len(), 2);
    }

    #[test]
    fn test_kind_change_prefills_defaults() {
        let mut controller = seeded();
        controller.begin_edit("2").unwrap();
        controller.change_kind(StepKind::WaitDelay).unwrap();
        let defaults = controller.form_defaults().unwrap();
        assert_eq!(defaults.get(MINUTES), Some("1 min"));
    }

    #[test]
    fn test_submit_delete() {
        let mut controller = seeded();
        controller.begin_edit("2").unwrap();
        assert!(controller.can_delete_target());
        controller.submit_delete().unwrap();
        assert!(controller.is_idle());
        assert_eq!(controller.graph().chain_ids(), vec!["1", "3"]);
    }

    #[test]
    fn test_delete_sole_lead_source_keeps_form_open() {
        let mut controller = seeded();
        controller.begin_edit("1").unwrap();
        assert!(!controller.can_delete_target());
        assert!(matches!(
            controller.submit_delete(),
            Err(FlowError::InvariantViolation(_))
        ));
        assert!(controller.composition().is_some());
        assert_eq!(controller.graph().len(), 3);
    }

    #[test]
    fn test_delete_in_add_session_rejected() {
        let mut controller = seeded();
        controller.begin_add(StepKind::WaitDelay).unwrap();
        assert!(controller.submit_delete().is_err());
        assert!(controller.composition().is_some());
    }

    #[test]
    fn test_stale_target_aborts_to_idle() {
        let mut graph = SequenceGraph::new();
        graph
            .add_step(StepKind::LeadSource, StepContent::lead_source("a@b.com"))
            .unwrap();
        graph
            .add_step(StepKind::WaitDelay, StepContent::wait_delay(5))
            .unwrap();
        let mut controller = SessionController::with_graph(graph);
        controller.begin_edit("2").unwrap();

        // Simulate the target disappearing underneath the open form.
        controller.graph.delete_step("2").unwrap();

        let err = controller
            .submit(&FormFields::new().with(MINUTES, "10"))
            .unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
        assert!(controller.is_idle());
    }

    #[test]
    fn test_submit_without_session() {
        let mut controller = seeded();
        assert!(matches!(
            controller.submit(&lead_fields()),
            Err(FlowError::NoActiveSession)
        ));
        assert!(matches!(controller.form_defaults(), Err(FlowError::NoActiveSession)));
    }

    #[test]
    fn test_one_shot_add_requires_lead_source_first() {
        let mut controller = SessionController::new();
        assert!(matches!(
            controller.add_step(StepKind::WaitDelay, StepContent::wait_delay(1)),
            Err(FlowError::InvariantViolation(_))
        ));
        assert!(controller.graph().is_empty());
        assert!(controller.is_idle());
    }

    #[test]
    fn test_export_blocks_mutation() {
        let mut controller = seeded();
        let payload = controller.begin_export().unwrap();
        assert_eq!(payload.steps.len(), 3);
        assert_eq!(controller.state(), &SessionState::Exporting);

        assert!(matches!(
            controller.add_step(StepKind::WaitDelay, StepContent::wait_delay(1)),
            Err(FlowError::Reentrancy(_))
        ));
        assert!(matches!(controller.begin_edit("2"), Err(FlowError::Reentrancy(_))));
        assert!(controller.cancel().is_err());
        assert!(controller
            .set_layout("1", serde_json::json!({ "x": 1 }))
            .is_ok());

        controller.finish_export();
        assert!(controller.is_idle());
        controller.delete_step("2").unwrap();
    }

    #[test]
    fn test_export_rejects_empty_graph() {
        let mut controller = SessionController::new();
        assert!(matches!(
            controller.begin_export(),
            Err(FlowError::InvariantViolation(_))
        ));
        assert!(controller.is_idle());
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let mut controller = seeded();
        controller.begin_edit("3").unwrap();
        let json = serde_json::to_value(controller.state()).unwrap();
        assert_eq!(json["state"], "composing");
        assert_eq!(json["kind"], "WaitDelay");
        assert_eq!(json["target"], "3");
    }

    #[test]
    fn test_edit_form_warns_about_new_head() {
        let mut controller = seeded();
        controller
            .add_step(StepKind::LeadSource, StepContent::lead_source("c@d.com"))
            .unwrap();

        controller.begin_edit("1").unwrap();
        assert!(controller.can_delete_target());
        assert!(controller.target_exposes_non_lead_head());
        controller.cancel().unwrap();

        controller.begin_edit("4").unwrap();
        assert!(!controller.target_exposes_non_lead_head());
        controller.cancel().unwrap();
    }
}
