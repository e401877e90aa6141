//! The sequence graph: steps, the connections between them, and the id counter.
//!
//! The graph is always a simple path. Steps are appended at the tail by
//! [`SequenceGraph::add_step`]; edits and deletions live in the reconciler
//! module and keep the same invariant.

use std::collections::{HashMap, HashSet};

use crate::error::{FlowError, FlowResult};
use super::model::{Connection, GraphSnapshot, Step, StepContent};
use super::registry::{self, StepKind};

/// Mutable collection of steps and connections.
///
/// Steps are kept in creation order. The id counter starts at 1 and only
/// moves forward, so a deleted step's id is never handed out again.
#[derive(Debug, Clone)]
pub struct SequenceGraph {
    pub(super) steps: Vec<Step>,
    pub(super) connections: Vec<Connection>,
    next_id: u64,
}

impl SequenceGraph {
    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            connections: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuilds a graph from stored parts.
    ///
    /// Fails with InvariantViolation if the parts do not form a simple path,
    /// or if `next_id` would hand out an id that is already in use.
    pub fn from_parts(steps: Vec<Step>, connections: Vec<Connection>, next_id: u64) -> FlowResult<Self> {
        for step in &steps {
            if let Ok(n) = step.id.parse::<u64>() {
                if n >= next_id {
                    return Err(FlowError::invariant(format!(
                        "step id {} is not below the next id {}",
                        step.id, next_id
                    )));
                }
            }
            registry::validate(step.kind(), &step.content)?;
        }
        let graph = Self {
            steps,
            connections,
            next_id: next_id.max(1),
        };
        graph.check_path()?;
        Ok(graph)
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The id the next added step will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Steps in creation order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// All connections.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Gets a step by id.
    pub fn get(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Returns true if a step with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// The connection arriving at `id`, if any.
    pub fn incoming(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.to == id)
    }

    /// The connection leaving `id`, if any.
    pub fn outgoing(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.from == id)
    }

    /// The step with no incoming connection.
    pub fn head(&self) -> Option<&Step> {
        self.steps.iter().find(|s| self.incoming(&s.id).is_none())
    }

    /// The step with no outgoing connection.
    pub fn tail(&self) -> Option<&Step> {
        self.steps.iter().rev().find(|s| self.outgoing(&s.id).is_none())
    }

    /// Steps in execution order, head to tail.
    pub fn chain(&self) -> Vec<&Step> {
        let next: HashMap<&str, &str> = self
            .connections
            .iter()
            .map(|c| (c.from.as_str(), c.to.as_str()))
            .collect();

        let mut ordered = Vec::with_capacity(self.steps.len());
        let mut seen = HashSet::new();
        let mut cursor = self.head();
        while let Some(step) = cursor {
            if !seen.insert(step.id.as_str()) {
                break;
            }
            ordered.push(step);
            cursor = next.get(step.id.as_str()).and_then(|to| self.get(to));
        }
        ordered
    }

    /// Step ids in execution order.
    pub fn chain_ids(&self) -> Vec<String> {
        self.chain().into_iter().map(|s| s.id.clone()).collect()
    }

    /// Number of LeadSource steps.
    pub fn lead_source_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.kind() == StepKind::LeadSource)
            .count()
    }

    /// Immutable copy of steps and connections.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            steps: self.steps.clone(),
            connections: self.connections.clone(),
        }
    }

    // =========================================================================
    // ADD
    // =========================================================================

    /// Validates `content`, assigns the next id and appends the step at the tail.
    ///
    /// The first step of an empty graph gets no connection; every later step is
    /// connected from the current tail.
    pub fn add_step(&mut self, kind: StepKind, content: StepContent) -> FlowResult<Step> {
        registry::validate(kind, &content)?;

        let id = self.allocate_id();
        let step = Step::new(id, content);
        let link = self.tail().map(|tail| Connection::between(tail.id.clone(), step.id.clone()));

        tracing::debug!(
            step_id = %step.id,
            kind = %kind,
            from = link.as_ref().map(|c| c.from.as_str()),
            "added step"
        );

        self.steps.push(step.clone());
        if let Some(link) = link {
            self.connections.push(link);
        }
        debug_assert!(self.check_path().is_ok());
        Ok(step)
    }

    fn allocate_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    // =========================================================================
    // LAYOUT
    // =========================================================================

    /// Replaces a step's layout hint. Structure is untouched.
    pub fn set_layout(&mut self, id: &str, layout: serde_json::Value) -> FlowResult<()> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| FlowError::not_found(id))?;
        step.layout = layout;
        Ok(())
    }

    // =========================================================================
    // INVARIANTS
    // =========================================================================

    /// Verifies the graph is a single simple path.
    ///
    /// Every connection joins two existing steps, no step has more than one
    /// incoming or outgoing connection, and walking from the head visits every
    /// step exactly once.
    pub fn check_path(&self) -> FlowResult<()> {
        let ids: HashSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        if ids.len() != self.steps.len() {
            return Err(FlowError::invariant("duplicate step id"));
        }

        let mut from_seen = HashSet::new();
        let mut to_seen = HashSet::new();
        let mut conn_ids = HashSet::new();
        for conn in &self.connections {
            if !conn_ids.insert(conn.id.as_str()) {
                return Err(FlowError::invariant(format!("duplicate connection id {}", conn.id)));
            }
            if !ids.contains(conn.from.as_str()) || !ids.contains(conn.to.as_str()) {
                return Err(FlowError::invariant(format!("dangling connection {}", conn.id)));
            }
            if conn.from == conn.to {
                return Err(FlowError::invariant(format!("self loop on step {}", conn.from)));
            }
            if !from_seen.insert(conn.from.as_str()) {
                return Err(FlowError::invariant(format!("step {} has two outgoing connections", conn.from)));
            }
            if !to_seen.insert(conn.to.as_str()) {
                return Err(FlowError::invariant(format!("step {} has two incoming connections", conn.to)));
            }
        }

        if !self.steps.is_empty() && self.connections.len() != self.steps.len() - 1 {
            return Err(FlowError::invariant(format!(
                "{} connections for {} steps",
                self.connections.len(),
                self.steps.len()
            )));
        }
        if self.chain().len() != self.steps.len() {
            return Err(FlowError::invariant("steps are not a single connected chain"));
        }
        Ok(())
    }

    /// Verifies the graph can be handed to the execution service: a non-empty
    /// simple path whose head is a LeadSource.
    pub fn check_exportable(&self) -> FlowResult<()> {
        self.check_path()?;
        match self.head() {
            None => Err(FlowError::invariant("cannot export an empty sequence")),
            Some(head) if head.kind() != StepKind::LeadSource => Err(FlowError::invariant(format!(
                "sequence must start with a LeadSource, found {}",
                head.kind()
            ))),
            Some(_) => Ok(()),
        }
    }
}

impl Default for SequenceGraph {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
