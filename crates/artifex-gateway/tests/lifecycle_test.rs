//! End-to-end lifecycle test: a generation job driven from request to
//! completion through the command bus, with committed events fanned out to a
//! subscribed connection and the read side kept current throughout.

mod common;

use tokio::sync::mpsc;
use uuid::Uuid;

use artifex_core::command::CommandMetadata;
use artifex_generation::domain::aggregates::GenerationStatus;
use artifex_generation::domain::commands::{
    CompleteImageGeneration, GenerationCommand, GenerationCommandKind, RequestImageGeneration,
    UpdateProgress,
};
use artifex_generation::domain::events::{GenerationParameters, GenerationResult};
use artifex_gateway::frames::ServerMessage;

#[tokio::test]
async fn test_full_lifecycle_from_request_to_completion() {
    let (_app, state) = common::build_test_app();

    // One connected client with a wildcard subscription.
    let client_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.registry.register(client_id, tx);
    let user_id = Uuid::new_v4();
    state.registry.authenticate(client_id, user_id);
    state.registry.subscribe(client_id, &[], true);

    let aggregate_id = Uuid::new_v4();
    let dispatch = |kind: GenerationCommandKind| {
        let command = GenerationCommand {
            aggregate_id,
            expected_version: None,
            metadata: CommandMetadata {
                correlation_id: Uuid::new_v4(),
                user_id: Some(user_id),
            },
            kind,
        };
        state.command_bus.dispatch(command)
    };

    // request → start (validates + queues) → start (begins processing)
    // → progress → complete.
    dispatch(GenerationCommandKind::RequestImageGeneration(
        RequestImageGeneration {
            prompt: "a lighthouse at dawn".to_owned(),
            parameters: GenerationParameters::default(),
        },
    ))
    .await
    .unwrap();
    dispatch(GenerationCommandKind::StartImageGeneration)
        .await
        .unwrap();
    dispatch(GenerationCommandKind::StartImageGeneration)
        .await
        .unwrap();
    dispatch(GenerationCommandKind::UpdateProgress(UpdateProgress {
        progress: 50,
    }))
    .await
    .unwrap();
    let outcome = dispatch(GenerationCommandKind::CompleteImageGeneration(
        CompleteImageGeneration {
            result: GenerationResult {
                image_url: "https://cdn.example/lighthouse.png".to_owned(),
                width: Some(1024),
                height: Some(1024),
                seed: Some(42),
            },
        },
    ))
    .await
    .unwrap();
    assert_eq!(outcome.version, 6);

    // The subscriber saw every event, in commit order, versions contiguous
    // from 1.
    let expected = [
        "ImageGenerationRequested",
        "ImageGenerationValidated",
        "ImageGenerationQueued",
        "ImageGenerationStarted",
        "ImageGenerationProgress",
        "ImageGenerationCompleted",
    ];
    for (index, expected_type) in expected.iter().enumerate() {
        let frame = rx.try_recv().expect("missing event frame");
        match frame.message {
            ServerMessage::EventOccurred { event } => {
                assert_eq!(event.event_type, *expected_type);
                assert_eq!(event.aggregate_id, aggregate_id);
                assert_eq!(event.version, i64::try_from(index).unwrap() + 1);
            }
            other => panic!("expected event.occurred, got {other:?}"),
        }
    }
    assert!(rx.try_recv().is_err());

    // The read side reflects the terminal state.
    let projection = state.projections.generation(aggregate_id).unwrap();
    assert_eq!(projection.status, GenerationStatus::Completed);
    assert_eq!(projection.progress_percentage, 100);
    assert_eq!(
        projection.result.as_ref().unwrap().image_url,
        "https://cdn.example/lighthouse.png"
    );

    // The queue is drained.
    let metrics = state.projections.queue_status();
    assert_eq!(metrics.total_in_queue, 0);
    assert_eq!(metrics.processing, 0);
}
