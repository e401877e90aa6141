//! End-to-end editing flows through the public API.

use heyoflow::sequence::codec;
use heyoflow::{
    Connection, FlowError, FormFields, SequenceDocument, SessionController, SessionState,
    StepContent, StepKind,
};

/// LeadSource(1) -> ColdEmail(2) -> WaitDelay(3), built through forms.
fn three_step_controller() -> SessionController {
    let mut controller = SessionController::new();
    controller.bootstrap().unwrap();
    controller
        .submit(&FormFields::new().with("recipient_email", "a@b.com"))
        .unwrap();

    controller.begin_add(StepKind::ColdEmail).unwrap();
    controller
        .submit(&FormFields::new().with("subject", "Hi").with("body", "Hello there"))
        .unwrap();

    controller.begin_add(StepKind::WaitDelay).unwrap();
    controller
        .submit(&FormFields::new().with("minutes", "30"))
        .unwrap();
    controller
}

#[test]
fn test_first_step_on_empty_graph() {
    let mut controller = SessionController::new();
    let step = controller
        .add_step(StepKind::LeadSource, StepContent::lead_source("a@b.com"))
        .unwrap();

    let graph = controller.graph();
    assert_eq!(graph.len(), 1);
    assert!(graph.connections().is_empty());
    assert_eq!(graph.head().unwrap().id, step.id);
    assert_eq!(graph.tail().unwrap().id, step.id);
}

#[test]
fn test_delete_interior_then_edit() {
    let mut controller = three_step_controller();

    controller.begin_edit("2").unwrap();
    assert!(controller.can_delete_target());
    controller.submit_delete().unwrap();

    assert_eq!(controller.graph().chain_ids(), vec!["1", "3"]);
    assert_eq!(controller.graph().connections(), &[Connection::between("1", "3")]);

    let connections = controller.graph().connections().to_vec();
    controller.begin_edit("3").unwrap();
    let step = controller
        .submit(&FormFields::new().with("minutes", "60 min"))
        .unwrap();

    assert_eq!(step.content, StepContent::wait_delay(60));
    assert_eq!(controller.graph().connections(), connections.as_slice());
    assert_eq!(codec::encode(&step.content), "WaitDelay\n- (60 min)");
}

#[test]
fn test_sole_lead_source_protected() {
    let mut controller = three_step_controller();
    let before = controller.snapshot();

    controller.begin_edit("1").unwrap();
    assert!(!controller.can_delete_target());
    let err = controller.submit_delete().unwrap_err();
    assert!(matches!(err, FlowError::InvariantViolation(_)));
    controller.cancel().unwrap();

    assert_eq!(controller.snapshot(), before);
    assert!(controller.is_idle());
}

#[test]
fn test_second_session_rejected() {
    let mut controller = three_step_controller();
    controller.begin_add(StepKind::ColdEmail).unwrap();

    assert!(matches!(
        controller.begin_edit("2"),
        Err(FlowError::Reentrancy(_))
    ));
    assert!(matches!(
        controller.delete_step("2"),
        Err(FlowError::Reentrancy(_))
    ));
    assert!(matches!(controller.state(), SessionState::Composing(_)));
}

#[test]
fn test_invalid_form_keeps_session_open() {
    let mut controller = three_step_controller();
    controller.begin_add(StepKind::ColdEmail).unwrap();

    let err = controller
        .submit(&FormFields::new().with("subject", "   "))
        .unwrap_err();
    assert!(matches!(err, FlowError::Validation { .. }));
    assert!(!err.issues().is_empty());
    assert_eq!(controller.graph().len(), 3);

    controller
        .submit(&FormFields::new().with("subject", "Second try").with("body", "Hi"))
        .unwrap();
    assert_eq!(controller.graph().chain_ids(), vec!["1", "2", "3", "4"]);
}

#[test]
fn test_edit_form_prefilled_from_step() {
    let mut controller = three_step_controller();
    controller.begin_edit("2").unwrap();

    let fields = controller.form_defaults().unwrap();
    assert_eq!(fields.get("subject"), Some("Hi"));
    assert_eq!(fields.get("body"), Some("Hello there"));
    controller.cancel().unwrap();
}

#[test]
fn test_many_adds_and_deletes_stay_a_path() {
    let mut controller = three_step_controller();
    for i in 0..20u32 {
        controller
            .add_step(StepKind::WaitDelay, StepContent::wait_delay(i + 1))
            .unwrap();
        if i % 3 == 0 {
            let ids = controller.graph().chain_ids();
            controller.delete_step(&ids[ids.len() / 2]).unwrap();
        }
    }

    let graph = controller.graph();
    assert!(graph.check_path().is_ok());
    assert_eq!(graph.chain().len(), graph.len());
    assert_eq!(graph.connections().len(), graph.len() - 1);
    assert_eq!(graph.head().unwrap().kind(), StepKind::LeadSource);
}

#[test]
fn test_document_round_trip_preserves_sequence() {
    let mut controller = three_step_controller();
    controller
        .set_layout("2", serde_json::json!({ "x": 250, "y": 120 }))
        .unwrap();
    controller.delete_step("2").unwrap();

    let bytes = SequenceDocument::from_graph(controller.graph())
        .unwrap()
        .save();
    let mut doc = SequenceDocument::from_bytes(&bytes).unwrap();
    let restored = doc.to_graph().unwrap();

    assert_eq!(restored.snapshot(), controller.snapshot());

    // The id counter survives, so ids are not reused after reload.
    let mut controller = SessionController::with_graph(restored);
    let step = controller
        .add_step(StepKind::ColdEmail, StepContent::cold_email("Back", "Again"))
        .unwrap();
    assert_eq!(step.id, "4");
}

#[test]
fn test_export_locks_editing() {
    let mut controller = three_step_controller();
    let payload = controller.begin_export().unwrap();
    assert_eq!(payload.steps.len(), 3);
    assert_eq!(controller.state(), &SessionState::Exporting);

    assert!(matches!(
        controller.begin_add(StepKind::WaitDelay),
        Err(FlowError::Reentrancy(_))
    ));
    controller.finish_export();
    assert!(controller.is_idle());
}
