//! WASM bindings for the sequence editor.
//!
//! This module provides JavaScript-friendly wrappers around the
//! SessionController for use by the flow chart UI in the browser. Rendering,
//! positioning and the HTTP call that starts the process stay in JavaScript.

use js_sys::{Array, Uint8Array};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

use crate::error::FlowError;
use super::codec::{self, FormFields};
use super::document::SequenceDocument;
use super::model::StepContent;
use super::registry::{self, StepKind, WAIT_PRESETS};
use super::session::SessionController;

/// Serialize a value to JsValue with HashMaps as plain JS objects (not Map).
fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&Serializer::new().serialize_maps_as_objects(true))
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<FlowError> for JsValue {
    fn from(err: FlowError) -> JsValue {
        JsValue::from_str(&err.to_string())
    }
}

/// Helper macro for Result conversion
macro_rules! js_result {
    ($expr:expr) => {
        $expr.map_err(|e: FlowError| JsValue::from(e))
    };
}

fn parse_kind(kind: &str) -> Result<StepKind, JsValue> {
    js_result!(kind.parse::<StepKind>())
}

// =============================================================================
// MAIN WRAPPER TYPE
// =============================================================================

/// JavaScript-friendly wrapper around SessionController.
#[wasm_bindgen]
pub struct JsSequenceEditor {
    inner: SessionController,
}

#[wasm_bindgen]
impl JsSequenceEditor {
    /// Creates an editor over an empty sequence.
    ///
    /// # Example (JavaScript)
    /// ```js
    /// const editor = new JsSequenceEditor();
    /// const session = editor.bootstrap(); // opens the Lead Source form
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new() -> JsSequenceEditor {
        JsSequenceEditor {
            inner: SessionController::new(),
        }
    }

    /// Loads a sequence saved with `toBytes`.
    #[wasm_bindgen(js_name = fromBytes)]
    pub fn from_bytes(bytes: &[u8]) -> Result<JsSequenceEditor, JsValue> {
        let mut doc = js_result!(SequenceDocument::from_bytes(bytes))?;
        let graph = js_result!(doc.to_graph())?;
        Ok(JsSequenceEditor {
            inner: SessionController::with_graph(graph),
        })
    }

    /// Saves the sequence to binary bytes (returns Uint8Array).
    ///
    /// # Example (JavaScript)
    /// ```js
    /// const bytes = editor.toBytes();
    /// // Save bytes to localStorage or IndexedDB
    /// ```
    #[wasm_bindgen(js_name = toBytes)]
    pub fn to_bytes(&self) -> Result<Uint8Array, JsValue> {
        let mut doc = js_result!(SequenceDocument::from_graph(self.inner.graph()))?;
        let bytes = doc.save();
        Ok(Uint8Array::from(&bytes[..]))
    }

    /// Gets `{ steps, connections }` for rendering.
    #[wasm_bindgen(js_name = getSnapshot)]
    pub fn get_snapshot(&self) -> Result<JsValue, JsValue> {
        Ok(to_js_value(&self.inner.snapshot())?)
    }

    /// Step ids in execution order.
    #[wasm_bindgen(js_name = getChain)]
    pub fn get_chain(&self) -> Array {
        let array = Array::new();
        for id in self.inner.graph().chain_ids() {
            array.push(&JsValue::from_str(&id));
        }
        array
    }

    /// Canonical text label of a step, e.g. `"WaitDelay\n- (60 min)"`.
    #[wasm_bindgen(js_name = getLabel)]
    pub fn get_label(&self, id: &str) -> Result<String, JsValue> {
        let step = self
            .inner
            .graph()
            .get(id)
            .ok_or_else(|| JsValue::from(FlowError::not_found(id)))?;
        Ok(codec::encode(&step.content))
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================

#[wasm_bindgen]
impl JsSequenceEditor {
    /// Current state, e.g. `{ state: "composing", kind: "ColdEmail", target: "2", session_id }`.
    #[wasm_bindgen(js_name = getState)]
    pub fn get_state(&self) -> Result<JsValue, JsValue> {
        Ok(to_js_value(self.inner.state())?)
    }

    /// True when add/edit/export triggers may be enabled.
    #[wasm_bindgen(js_name = isIdle)]
    pub fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    /// Whether the open edit form should show a Delete button.
    #[wasm_bindgen(js_name = canDeleteTarget)]
    pub fn can_delete_target(&self) -> bool {
        self.inner.can_delete_target()
    }

    /// Whether deleting the open edit target leaves a sequence that cannot be
    /// exported until a LeadSource heads it again.
    #[wasm_bindgen(js_name = deleteExposesNonLeadHead)]
    pub fn delete_exposes_non_lead_head(&self) -> bool {
        self.inner.target_exposes_non_lead_head()
    }
}

// =============================================================================
// SESSION METHODS
// =============================================================================

#[wasm_bindgen]
impl JsSequenceEditor {
    /// Opens the Lead Source form on an empty sequence. Returns null otherwise.
    pub fn bootstrap(&mut self) -> Result<JsValue, JsValue> {
        match js_result!(self.inner.bootstrap())? {
            Some(c) => Ok(to_js_value(&c)?),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = beginAdd)]
    pub fn begin_add(&mut self, kind: &str) -> Result<JsValue, JsValue> {
        let kind = parse_kind(kind)?;
        let composition = js_result!(self.inner.begin_add(kind))?;
        Ok(to_js_value(&composition)?)
    }

    #[wasm_bindgen(js_name = beginEdit)]
    pub fn begin_edit(&mut self, id: &str) -> Result<JsValue, JsValue> {
        let composition = js_result!(self.inner.begin_edit(id))?;
        Ok(to_js_value(&composition)?)
    }

    #[wasm_bindgen(js_name = changeKind)]
    pub fn change_kind(&mut self, kind: &str) -> Result<JsValue, JsValue> {
        let kind = parse_kind(kind)?;
        let composition = js_result!(self.inner.change_kind(kind))?;
        Ok(to_js_value(&composition)?)
    }

    /// Closes the open form without applying it.
    pub fn cancel(&mut self) -> Result<(), JsValue> {
        js_result!(self.inner.cancel())
    }

    /// Values to pre-fill the open form with, as a plain object.
    #[wasm_bindgen(js_name = formDefaults)]
    pub fn form_defaults(&self) -> Result<JsValue, JsValue> {
        let fields = js_result!(self.inner.form_defaults())?;
        Ok(to_js_value(&fields)?)
    }

    /// Submits the open form. `fields` is a plain object of field name to string.
    ///
    /// # Example (JavaScript)
    /// ```js
    /// editor.beginAdd("ColdEmail");
    /// const step = editor.submit({ subject: "Hello", body: "Nice to meet you" });
    /// ```
    pub fn submit(&mut self, fields: JsValue) -> Result<JsValue, JsValue> {
        let fields: FormFields = from_value(fields)?;
        let step = js_result!(self.inner.submit(&fields))?;
        Ok(to_js_value(&step)?)
    }

    /// Deletes the target of the open edit form.
    #[wasm_bindgen(js_name = submitDelete)]
    pub fn submit_delete(&mut self) -> Result<JsValue, JsValue> {
        let step = js_result!(self.inner.submit_delete())?;
        Ok(to_js_value(&step)?)
    }

    /// Stores presentation positioning for a step; never affects structure.
    #[wasm_bindgen(js_name = setLayout)]
    pub fn set_layout(&mut self, id: &str, layout: JsValue) -> Result<(), JsValue> {
        let layout: serde_json::Value = from_value(layout)?;
        js_result!(self.inner.set_layout(id, layout))
    }
}

// =============================================================================
// ONE-SHOT METHODS
// =============================================================================

#[wasm_bindgen]
impl JsSequenceEditor {
    /// Adds a step from `{ kind, content }`.
    #[wasm_bindgen(js_name = addStep)]
    pub fn add_step(&mut self, content: JsValue) -> Result<JsValue, JsValue> {
        let content: StepContent = from_value(content)?;
        let step = js_result!(self.inner.add_step(content.kind(), content))?;
        Ok(to_js_value(&step)?)
    }

    /// Replaces a step's content with `{ kind, content }`.
    #[wasm_bindgen(js_name = editStep)]
    pub fn edit_step(&mut self, id: &str, content: JsValue) -> Result<JsValue, JsValue> {
        let content: StepContent = from_value(content)?;
        let step = js_result!(self.inner.edit_step(id, content.kind(), content))?;
        Ok(to_js_value(&step)?)
    }

    #[wasm_bindgen(js_name = deleteStep)]
    pub fn delete_step(&mut self, id: &str) -> Result<JsValue, JsValue> {
        let step = js_result!(self.inner.delete_step(id))?;
        Ok(to_js_value(&step)?)
    }
}

// =============================================================================
// EXPORT METHODS
// =============================================================================

#[wasm_bindgen]
impl JsSequenceEditor {
    /// Validates the sequence and returns the start-process payload. Editing is
    /// locked until `finishExport` is called.
    ///
    /// # Example (JavaScript)
    /// ```js
    /// const payload = editor.beginExport();
    /// try {
    ///   await axios.post(`${API}/api/v1/sequence/start-process`, payload);
    /// } finally {
    ///   editor.finishExport();
    /// }
    /// ```
    #[wasm_bindgen(js_name = beginExport)]
    pub fn begin_export(&mut self) -> Result<JsValue, JsValue> {
        let payload = js_result!(self.inner.begin_export())?;
        Ok(to_js_value(&payload)?)
    }

    #[wasm_bindgen(js_name = finishExport)]
    pub fn finish_export(&mut self) {
        self.inner.finish_export();
    }
}

// =============================================================================
// REGISTRY FUNCTIONS
// =============================================================================

/// Form schema for a step kind: `{ kind, label, fields: [...] }`.
#[wasm_bindgen(js_name = stepSchema)]
pub fn step_schema(kind: &str) -> Result<JsValue, JsValue> {
    let kind = parse_kind(kind)?;
    Ok(to_js_value(registry::schema(kind))?)
}

/// Durations offered by the wait picker.
#[wasm_bindgen(js_name = waitPresets)]
pub fn wait_presets() -> Result<JsValue, JsValue> {
    Ok(to_js_value(&WAIT_PRESETS)?)
}

impl Default for JsSequenceEditor {
    fn default() -> Self {
        Self::new()
    }
}
