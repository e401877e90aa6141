//! HeyoFlow - Sequence graph engine for linear outreach flows.
//!
//! An outreach sequence is a single chain of typed steps: a lead source, then
//! cold emails and waits in any order. This crate keeps that chain consistent
//! while a user edits it and produces the payload handed to the execution
//! service:
//!
//! - **Typed content**: each step kind has a fixed schema, validated on every change
//! - **Always a path**: adds append at the tail, deletes bridge the gap
//! - **One session at a time**: the session controller guards every mutation
//!
//! # Example
//!
//! ```rust
//! use heyoflow::{FormFields, SessionController, StepKind};
//!
//! let mut controller = SessionController::new();
//!
//! // An empty sequence always starts with a lead source form.
//! controller.bootstrap().unwrap();
//! controller
//!     .submit(&FormFields::new().with("recipient_email", "lead@example.com"))
//!     .unwrap();
//!
//! controller.begin_add(StepKind::WaitDelay).unwrap();
//! controller
//!     .submit(&FormFields::new().with("minutes", "60 min"))
//!     .unwrap();
//!
//! assert_eq!(controller.graph().chain_ids(), vec!["1", "2"]);
//! let payload = controller.begin_export().unwrap();
//! assert_eq!(payload.steps[1].label, "WaitDelay\n- (60 min)");
//! controller.finish_export();
//! ```

pub mod error;
pub mod export;

// Sequence module
pub mod sequence;

// Re-exports for convenience
pub use error::{FieldIssue, FlowError, FlowResult};
pub use export::{ExportConfig, ExportError, ExportPayload, ProcessStarter};
pub use sequence::{
    Composition, Connection, FormFields, GraphSnapshot, SequenceDocument, SequenceGraph,
    SessionController, SessionState, Step, StepContent, StepKind,
};

#[cfg(feature = "export")]
pub use export::HttpProcessStarter;

#[cfg(feature = "wasm")]
pub use sequence::JsSequenceEditor;
