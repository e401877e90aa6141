//! Sequence graph module.
//!
//! Step registry, content codec, the graph and its reconciler, the session
//! controller that drives them, and the portable document form.

pub mod registry;
pub mod model;
pub mod codec;
pub mod graph;
pub mod reconciler;
pub mod session;
pub mod document;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use codec::FormFields;
pub use document::SequenceDocument;
pub use graph::SequenceGraph;
pub use model::{Connection, GraphSnapshot, Step, StepContent};
pub use registry::StepKind;
pub use session::{Composition, SessionController, SessionState};

#[cfg(feature = "wasm")]
pub use wasm::JsSequenceEditor;
