//! Lead board moves against a mock backend

use leadflow_engine::{BoardNotice, Card, KanbanError, KanbanStatusController, MoveOutcome};
use leadflow_types::{KanbanStatus, LeadId};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{backend, bodies};

fn board(server: &MockServer) -> (KanbanStatusController, UnboundedReceiver<BoardNotice>) {
    let (board, notices) = KanbanStatusController::new(backend(server));
    board.load([
        Card::new(LeadId::new("a"), "Ana", KanbanStatus::Warm),
        Card::new(LeadId::new("b"), "Bruno", KanbanStatus::Warm),
        Card::new(LeadId::new("c"), "Carla", KanbanStatus::Warm),
        Card::new(LeadId::new("d"), "Davi", KanbanStatus::Converted),
    ]);
    (board, notices)
}

#[tokio::test]
async fn confirmed_conversion_celebrates() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/leads/b"))
        .and(body_json(json!({"status": "converted"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let (board, mut notices) = board(&server);
    let outcome = board
        .move_card(&LeadId::new("b"), KanbanStatus::Warm, KanbanStatus::Converted)
        .await
        .unwrap();

    assert_eq!(outcome, MoveOutcome::Moved);
    assert_eq!(board.count(KanbanStatus::Warm), 2);
    assert_eq!(board.count(KanbanStatus::Converted), 2);
    assert_eq!(
        notices.recv().await,
        Some(BoardNotice::Moved {
            card: LeadId::new("b"),
            to: KanbanStatus::Converted
        })
    );
    assert_eq!(
        notices.recv().await,
        Some(BoardNotice::Celebrate {
            card: LeadId::new("b")
        })
    );
}

#[tokio::test]
async fn server_error_restores_column_position_and_counters() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/leads/b"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "db down"})))
        .mount(&server)
        .await;

    let (board, mut notices) = board(&server);
    let err = board
        .move_card(&LeadId::new("b"), KanbanStatus::Warm, KanbanStatus::Converted)
        .await
        .unwrap_err();

    assert!(matches!(err, KanbanError::Backend { .. }));
    let warm: Vec<String> = board
        .column(KanbanStatus::Warm)
        .into_iter()
        .map(|card| card.id.as_str().to_string())
        .collect();
    assert_eq!(warm, ["a", "b", "c"]);
    assert_eq!(board.count(KanbanStatus::Warm), 3);
    assert_eq!(board.count(KanbanStatus::Converted), 1);
    assert_eq!(board.status_of(&LeadId::new("b")), Some(KanbanStatus::Warm));

    let Some(BoardNotice::MoveFailed { card, from, to, reason }) = notices.recv().await else {
        panic!("expected a failure notice");
    };
    assert_eq!(card, LeadId::new("b"));
    assert_eq!((from, to), (KanbanStatus::Warm, KanbanStatus::Converted));
    assert_eq!(reason, "db down");

    // Status updates are not retried.
    assert_eq!(bodies(&server, "PATCH", "/leads/b").await.len(), 1);
}

#[tokio::test]
async fn same_column_drop_is_a_no_op() {
    let server = MockServer::start().await;
    let (board, _notices) = board(&server);

    let outcome = board
        .move_card(&LeadId::new("a"), KanbanStatus::Warm, KanbanStatus::Warm)
        .await
        .unwrap();
    assert_eq!(outcome, MoveOutcome::NoOp);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
