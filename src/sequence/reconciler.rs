//! Edit and delete operations, and the connection repair they require.
//!
//! Deletion is planned first ([`plan_removal`]) and applied afterwards, so a
//! rejected delete never touches the graph.

use crate::error::{FlowError, FlowResult};
use super::graph::SequenceGraph;
use super::model::{Connection, Step, StepContent};
use super::registry::{self, StepKind};

/// Connection changes needed to remove one step from a simple path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    /// Ids of connections to drop.
    pub remove: Vec<String>,
    /// Connection joining the removed step's neighbours, for interior steps.
    pub bridge: Option<Connection>,
}

/// Plans the connection repair for removing step `id`.
///
/// - interior step: drop both edges and bridge `incoming.from → outgoing.to`
/// - head or tail: drop the single edge
/// - isolated step: nothing to do
pub fn plan_removal(connections: &[Connection], id: &str) -> Repair {
    let incoming = connections.iter().find(|c| c.to == id);
    let outgoing = connections.iter().find(|c| c.from == id);

    match (incoming, outgoing) {
        (Some(inc), Some(out)) => Repair {
            remove: vec![inc.id.clone(), out.id.clone()],
            bridge: Some(Connection::between(inc.from.clone(), out.to.clone())),
        },
        (Some(only), None) | (None, Some(only)) => Repair {
            remove: vec![only.id.clone()],
            bridge: None,
        },
        (None, None) => Repair {
            remove: Vec::new(),
            bridge: None,
        },
    }
}

impl SequenceGraph {
    /// Replaces the kind and content of a step in place.
    ///
    /// The id, layout hint and every connection touching the step are kept.
    /// Changing the kind of the only LeadSource is rejected because it would
    /// leave the sequence without an entry point.
    pub fn edit_step(&mut self, id: &str, kind: StepKind, content: StepContent) -> FlowResult<Step> {
        let current = self.get(id).ok_or_else(|| FlowError::not_found(id))?;
        registry::validate(kind, &content)?;

        if current.kind() == StepKind::LeadSource
            && kind != StepKind::LeadSource
            && self.lead_source_count() == 1
        {
            return Err(FlowError::invariant(format!(
                "step {} is the only LeadSource and cannot change kind",
                id
            )));
        }

        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| FlowError::not_found(id))?;
        step.content = content;
        tracing::debug!(step_id = %id, kind = %kind, "edited step");
        Ok(step.clone())
    }

    /// Returns true if [`delete_step`](Self::delete_step) would accept `id`.
    pub fn can_delete(&self, id: &str) -> bool {
        self.check_deletable(id).is_ok()
    }

    /// Returns true if deleting `id` would leave a head that is not a
    /// LeadSource. Such a delete is accepted, but the sequence cannot be
    /// exported until a LeadSource leads it again.
    pub fn exposes_non_lead_head(&self, id: &str) -> bool {
        if self.head().map(|h| h.id.as_str()) != Some(id) {
            return false;
        }
        self.outgoing(id)
            .and_then(|c| self.get(&c.to))
            .is_some_and(|next| next.kind() != StepKind::LeadSource)
    }

    fn check_deletable(&self, id: &str) -> FlowResult<&Step> {
        let step = self.get(id).ok_or_else(|| FlowError::not_found(id))?;
        if step.kind() == StepKind::LeadSource && self.lead_source_count() == 1 && self.len() > 1 {
            return Err(FlowError::invariant(format!(
                "step {} is the only LeadSource and other steps depend on it",
                id
            )));
        }
        Ok(step)
    }

    /// Removes a step and repairs the chain around it. Returns the removed step.
    ///
    /// Deleting the only LeadSource is allowed only when it is the last step,
    /// which leaves the sequence empty.
    pub fn delete_step(&mut self, id: &str) -> FlowResult<Step> {
        self.check_deletable(id)?;
        if self.exposes_non_lead_head(id) {
            tracing::warn!(step_id = %id, "delete leaves a sequence that does not start with a LeadSource");
        }
        let repair = plan_removal(&self.connections, id);

        self.connections.retain(|c| !repair.remove.contains(&c.id));
        if let Some(bridge) = &repair.bridge {
            self.connections.push(bridge.clone());
        }
        let index = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| FlowError::not_found(id))?;
        let removed = self.steps.remove(index);

        tracing::debug!(
            step_id = %id,
            removed_connections = repair.remove.len(),
            bridge = repair.bridge.as_ref().map(|c| c.id.as_str()),
            "deleted step"
        );
        debug_assert!(self.check_path().is_ok());
        Ok(removed)
    }
}

// =============================================================================
// TESTS
// =============================================================================
