//! Integration tests for cardsync
//!
//! These tests drive whole sync events through the extractor against the
//! in-memory source, sink and store, plus the SQLite store and JSONL sink.

use cardsync::config::{validate_config_result, ExtractorConfig, PageSize};
use cardsync::extraction::{Extractor, ExtractorSettings};
use cardsync::model::{Credentials, EventType, ExtractionState, Outcome, SyncEvent, SyncMode};
use cardsync::normalize::conversions::STAGES;
use cardsync::sink::{jsonl::read_artifact, JsonlSink, MemorySink};
use cardsync::source::{ApiResponse, EntityType, MemorySource};
use cardsync::store::{MemoryStateStore, SqliteStateStore, StateStore};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const BOARD: &str = "5f5e1000cccccccccccccccc";
const BACKLOG: &str = "5f5e1000bbbbbbbbbbbbbbb1";
const DOING: &str = "5f5e1000bbbbbbbbbbbbbbb2";

/// Object id whose embedded creation time is 2020-09-13
fn id(n: usize) -> String {
    format!("5f5e1000{:016x}", n)
}

fn credentials() -> Credentials {
    Credentials {
        key: "key=k&token=t".to_string(),
        org_id: Some("org-1".to_string()),
    }
}

fn card(n: usize, modified: &str) -> Value {
    json!({
        "id": id(n),
        "name": format!("Card {}", n),
        "desc": "First line\n\nSecond line",
        "idList": if n % 2 == 0 { BACKLOG } else { DOING },
        "idMembers": [id(100)],
        "url": format!("https://trello.com/c/{}", n),
        "dateLastActivity": modified,
    })
}

fn board_source(cards: usize, users: usize) -> MemorySource {
    MemorySource::new()
        .with_items(
            EntityType::Cards,
            (1..=cards)
                .map(|n| card(n, &format!("2024-01-{:02}T00:00:00.000Z", n.min(28))))
                .collect(),
        )
        .with_items(
            EntityType::Users,
            (1..=users)
                .map(|n| json!({"id": id(100 + n), "username": format!("user{}", n), "fullName": "U"}))
                .collect(),
        )
        .with_items(
            EntityType::Lists,
            vec![
                json!({"id": BACKLOG, "name": "To Do"}),
                json!({"id": DOING, "name": "Doing"}),
            ],
        )
}

fn extractor(
    source: Arc<MemorySource>,
    sink: Arc<MemorySink>,
    store: Arc<dyn StateStore>,
    page_size: i64,
) -> Extractor {
    Extractor::with_settings(
        source,
        sink,
        store,
        ExtractorSettings {
            page_size: PageSize::new(page_size).unwrap(),
            ..Default::default()
        },
    )
}

fn counts(outcome: &Outcome) -> Vec<(String, u64)> {
    match outcome {
        Outcome::Done { artifacts } => artifacts
            .iter()
            .map(|a| (a.item_type.clone(), a.item_count))
            .collect(),
        other => panic!("expected DONE, got {:?}", other),
    }
}

mod initial_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_artifacts_only_for_phases_that_pushed() {
        let source = Arc::new(board_source(3, 0));
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());

        let outcome = extractor(source, sink.clone(), store, 10)
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;

        assert_eq!(counts(&outcome), vec![("cards".to_string(), 3)]);
        assert!(sink.pushed_ids("users").is_empty());
    }

    #[tokio::test]
    async fn test_twelve_items_page_ten_then_two() {
        let source = Arc::new(board_source(12, 1));
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());

        let outcome = extractor(source.clone(), sink.clone(), store, 10)
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;

        assert_eq!(
            counts(&outcome),
            vec![("users".to_string(), 1), ("cards".to_string(), 12)]
        );

        let card_pages = source.calls_for(EntityType::Cards);
        assert_eq!(card_pages.len(), 2);
        assert_eq!(card_pages[0].cursor, None);
        assert_eq!(card_pages[1].cursor, Some(id(3)));

        let pushes: Vec<_> = sink
            .pushes()
            .into_iter()
            .filter(|(t, _)| t == "cards")
            .map(|(_, n)| n)
            .collect();
        assert_eq!(pushes, vec![10, 2]);
    }

    #[tokio::test]
    async fn test_attachments_family_after_data() {
        let source = Arc::new(
            board_source(2, 0)
                .with_items(
                    EntityType::Attachments,
                    vec![json!({
                        "id": id(2),
                        "dateLastActivity": "2024-01-02T00:00:00.000Z",
                        "attachments": [{
                            "id": id(300),
                            "name": "design.pdf",
                            "url": format!("https://trello.com/1/cards/{}/attachments/{}/download/design.pdf", id(2), id(300)),
                            "mimeType": "application/pdf",
                            "bytes": 1024,
                            "idMember": id(100),
                            "date": "2024-01-02T00:00:00.000Z"
                        }]
                    })],
                )
                .with_items(
                    EntityType::Labels,
                    vec![
                        json!({"id": id(400), "name": "Bug", "color": "red"}),
                        json!({"id": id(401), "name": "", "color": "sky_light"}),
                    ],
                ),
        );
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());
        let extractor = extractor(source, sink.clone(), store.clone(), 10);

        extractor
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;
        let outcome = extractor
            .handle(SyncEvent::new(EventType::AttachmentsStart, BOARD, credentials()))
            .await;

        assert_eq!(
            counts(&outcome),
            vec![("attachments".to_string(), 1), ("labels".to_string(), 2)]
        );

        let labels = sink.records("labels");
        let unnamed = labels.iter().find(|r| r.id == id(401)).unwrap();
        let json = serde_json::to_value(unnamed).unwrap();
        assert_eq!(json["data"]["name"], "label-sky_light");
        assert_eq!(json["data"]["color"], "#87CEEB");

        let attachment = serde_json::to_value(&sink.records("attachments")[0]).unwrap();
        assert_eq!(attachment["data"]["parent_id"], id(2));
        assert_eq!(attachment["data"]["file_name"], "design.pdf");
    }
}

mod incremental_tests {
    use super::*;

    fn previous_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn completed_state() -> ExtractionState {
        let mut state = ExtractionState::new();
        state.users.completed = true;
        state.cards.completed = true;
        state
    }

    #[tokio::test]
    async fn test_only_records_modified_after_previous_start() {
        let source = Arc::new(
            MemorySource::new()
                .with_items(
                    EntityType::Cards,
                    vec![
                        card(1, "2024-01-05T00:00:00.000Z"),
                        card(2, "2024-02-03T12:00:00.000Z"),
                        card(3, "2024-01-31T23:59:59.000Z"),
                    ],
                )
                .with_items(EntityType::Users, vec![json!({"id": id(101), "username": "u"})])
                .with_items(
                    EntityType::Lists,
                    vec![json!({"id": BACKLOG, "name": "Backlog"}), json!({"id": DOING, "name": "In Progress"})],
                ),
        );
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(
            MemoryStateStore::new()
                .with_last_successful_start(BOARD, previous_start())
                .with_state(BOARD, completed_state()),
        );

        let event = SyncEvent::new(EventType::Start, BOARD, credentials())
            .with_mode(SyncMode::Incremental);
        let outcome = extractor(source.clone(), sink.clone(), store, 10)
            .handle(event)
            .await;

        assert_eq!(counts(&outcome), vec![("cards".to_string(), 1)]);
        assert_eq!(sink.pushed_ids("cards"), vec![id(2)]);
        assert!(source.calls_for(EntityType::Users).is_empty());
    }

    #[tokio::test]
    async fn test_incremental_after_initial_run() {
        let source = Arc::new(board_source(4, 1));
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());
        let extractor = extractor(source.clone(), sink.clone(), store.clone(), 10);

        let first = extractor
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;
        assert_eq!(counts(&first).len(), 2);

        // Card 1 changes after the first run started
        let mut cards: Vec<Value> = (2..=4)
            .map(|n| card(n, "2024-01-02T00:00:00.000Z"))
            .collect();
        cards.push(card(1, "2999-01-01T00:00:00.000Z"));
        source.set_items(EntityType::Cards, cards);

        let second = extractor
            .handle(
                SyncEvent::new(EventType::Start, BOARD, credentials())
                    .with_mode(SyncMode::Incremental),
            )
            .await;
        assert_eq!(counts(&second), vec![("cards".to_string(), 1)]);
    }
}

mod resume_tests {
    use super::*;

    #[tokio::test]
    async fn test_continue_never_repushes() {
        let source = Arc::new(board_source(12, 0));
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());

        // Cards 12..8 went out in an earlier invocation
        let mut state = ExtractionState::new();
        state.users.completed = true;
        state.cards.cursor = Some(id(8));
        state.cards.pushed = 5;
        state.cards.artifact_id = Some("cards-run".to_string());

        let resumed = extractor(source, sink.clone(), store, 5)
            .handle(SyncEvent::new(EventType::Continue, BOARD, credentials()).with_state(state))
            .await;

        assert_eq!(counts(&resumed), vec![("cards".to_string(), 12)]);
        let ids = sink.pushed_ids("cards");
        assert_eq!(ids.len(), 7);
        assert!(ids.iter().all(|i| i.as_str() < id(8).as_str()));
    }

    #[tokio::test]
    async fn test_delay_then_continue_completes() {
        let source = Arc::new(board_source(12, 0));
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());
        let extractor = extractor(source.clone(), sink.clone(), store.clone(), 10);

        source.respond_next(EntityType::Cards, ApiResponse::ok(
            (3..=12).rev().map(|n| card(n, "2024-01-01T00:00:00.000Z")).collect(),
        ));
        source.respond_next(EntityType::Cards, ApiResponse::rate_limited(Some("20")));

        let first = extractor
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;
        assert_eq!(first, Outcome::Delay { delay_seconds: 20 });
        assert_eq!(sink.pushed_ids("cards").len(), 10);

        let second = extractor
            .handle(SyncEvent::new(EventType::Continue, BOARD, credentials()))
            .await;
        assert_eq!(counts(&second), vec![("cards".to_string(), 12)]);

        let mut ids = sink.pushed_ids("cards");
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }
}

mod rate_limit_tests {
    use super::*;

    #[tokio::test]
    async fn test_delay_leaves_state_byte_for_byte() {
        let source = Arc::new(board_source(12, 0));
        let sink = Arc::new(MemorySink::new());
        let mut state = ExtractionState::new();
        state.users.completed = true;
        state.cards.cursor = Some(id(3));
        state.cards.pushed = 10;
        state.cards.artifact_id = Some("cards-1".to_string());
        let store = Arc::new(MemoryStateStore::new().with_state(BOARD, state));
        let before = serde_json::to_string(&store.load(BOARD).unwrap()).unwrap();

        source.respond_next(EntityType::Cards, ApiResponse::rate_limited(Some("45")));
        let outcome = extractor(source, sink.clone(), store.clone(), 10)
            .handle(SyncEvent::new(EventType::Continue, BOARD, credentials()))
            .await;

        assert_eq!(outcome, Outcome::Delay { delay_seconds: 45 });
        let after = serde_json::to_string(&store.load(BOARD).unwrap()).unwrap();
        assert_eq!(before, after);
        assert!(sink.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_hint_uses_default_delay() {
        let source = Arc::new(board_source(1, 1));
        source.respond_next(EntityType::Users, ApiResponse::rate_limited(None));
        let store = Arc::new(MemoryStateStore::new());

        let outcome = Extractor::with_settings(
            source,
            Arc::new(MemorySink::new()),
            store,
            ExtractorSettings {
                default_delay_secs: 17,
                ..Default::default()
            },
        )
        .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
        .await;

        assert_eq!(outcome, Outcome::Delay { delay_seconds: 17 });
    }
}

mod normalizer_output_tests {
    use super::*;

    #[tokio::test]
    async fn test_records_satisfy_canonical_shape() {
        let source = Arc::new(board_source(6, 2));
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());

        extractor(source, sink.clone(), store, 4)
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;

        let records: Vec<_> = sink
            .records("users")
            .into_iter()
            .chain(sink.records("cards"))
            .collect();
        assert_eq!(records.len(), 8);

        for record in records {
            let json = serde_json::to_value(&record).unwrap();
            assert!(!json["id"].as_str().unwrap().is_empty());
            for field in ["created_date", "modified_date"] {
                let value = json[field].as_str().unwrap();
                assert!(DateTime::parse_from_rfc3339(value).is_ok(), "{}", value);
            }
            if let Some(stage) = json["data"].get("stage") {
                assert!(STAGES.contains(&stage.as_str().unwrap()));
            }
            if let Some(body) = json["data"].get("body") {
                let lines = body.as_array().unwrap();
                assert!(!lines.is_empty());
                assert!(lines.iter().all(|l| l.is_string()));
            }
        }
    }

    #[tokio::test]
    async fn test_unmapped_lists_fail_the_phase() {
        let source = Arc::new(
            MemorySource::new()
                .with_items(EntityType::Cards, vec![card(1, "2024-01-01T00:00:00.000Z")])
                .with_items(EntityType::Lists, vec![json!({"id": DOING, "name": "Ideas"})]),
        );
        let store = Arc::new(MemoryStateStore::new());

        let outcome = extractor(source, Arc::new(MemorySink::new()), store, 10)
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;

        match outcome {
            Outcome::Error { message } => assert!(message.contains("cards")),
            other => panic!("expected ERROR, got {:?}", other),
        }
    }
}

mod normalization_escalation_tests {
    use super::*;

    const UNMAPPED: &str = "5f5e1000bbbbbbbbbbbbbbb9";

    fn unmapped_card(n: usize) -> Value {
        json!({
            "id": id(n),
            "name": format!("Card {}", n),
            "idList": UNMAPPED,
            "dateLastActivity": "2024-01-01T00:00:00.000Z",
        })
    }

    #[tokio::test]
    async fn test_bad_records_on_resumed_page_are_skipped() {
        let mut cards: Vec<Value> = (3..=12)
            .map(|n| card(n, "2024-01-01T00:00:00.000Z"))
            .collect();
        cards.push(unmapped_card(1));
        cards.push(unmapped_card(2));
        let source = Arc::new(
            board_source(0, 0).with_items(EntityType::Cards, cards),
        );
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryStateStore::new());
        let extractor = extractor(source.clone(), sink.clone(), store.clone(), 10);

        source.respond_next(
            EntityType::Cards,
            ApiResponse::ok(
                (3..=12)
                    .rev()
                    .map(|n| card(n, "2024-01-01T00:00:00.000Z"))
                    .collect(),
            ),
        );
        source.respond_next(EntityType::Cards, ApiResponse::rate_limited(None));

        let first = extractor
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;
        assert_eq!(first, Outcome::Delay { delay_seconds: 5 });

        let second = extractor
            .handle(SyncEvent::new(EventType::Continue, BOARD, credentials()))
            .await;
        assert_eq!(counts(&second), vec![("cards".to_string(), 10)]);
    }

    #[tokio::test]
    async fn test_failed_phase_is_not_done_on_continue() {
        let source = Arc::new(
            board_source(0, 1)
                .with_items(EntityType::Cards, vec![unmapped_card(1), unmapped_card(2)]),
        );
        let store = Arc::new(MemoryStateStore::new());
        let extractor = extractor(source, Arc::new(MemorySink::new()), store.clone(), 10);

        let first = extractor
            .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
            .await;
        assert!(first.is_error());
        assert!(!store.load(BOARD).unwrap().unwrap().cards.completed);

        let second = extractor
            .handle(SyncEvent::new(EventType::Continue, BOARD, credentials()))
            .await;
        assert!(second.is_error());
        assert!(store.last_successful_start(BOARD).unwrap().is_none());
    }
}

mod sqlite_store_tests {
    use super::*;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("state.db");

        {
            let source = Arc::new(board_source(3, 1));
            source.respond_next(EntityType::Cards, ApiResponse::rate_limited(Some("9")));
            let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&db).unwrap());
            let outcome = extractor(source, Arc::new(MemorySink::new()), store, 10)
                .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
                .await;
            assert_eq!(outcome, Outcome::Delay { delay_seconds: 9 });
        }

        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&db).unwrap());
        let state = store.load(BOARD).unwrap().unwrap();
        assert!(state.users.completed);
        assert_eq!(state.users.pushed, 1);
        assert!(!state.cards.completed);
        assert!(store.last_successful_start(BOARD).unwrap().is_none());

        let source = Arc::new(board_source(3, 1));
        let sink = Arc::new(MemorySink::new());
        let outcome = extractor(source.clone(), sink, store.clone(), 10)
            .handle(SyncEvent::new(EventType::Continue, BOARD, credentials()))
            .await;

        assert_eq!(
            counts(&outcome),
            vec![("users".to_string(), 1), ("cards".to_string(), 3)]
        );
        assert!(source.calls_for(EntityType::Users).is_empty());
        assert!(store.last_successful_start(BOARD).unwrap().is_some());
    }
}

mod jsonl_sink_tests {
    use super::*;

    #[tokio::test]
    async fn test_artifacts_written_as_jsonl() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(JsonlSink::new(temp_dir.path()));
        let source = Arc::new(board_source(3, 0));

        let outcome = Extractor::with_settings(
            source,
            sink.clone(),
            Arc::new(MemoryStateStore::new()),
            ExtractorSettings {
                page_size: PageSize::new(2).unwrap(),
                ..Default::default()
            },
        )
        .handle(SyncEvent::new(EventType::Start, BOARD, credentials()))
        .await;

        let artifact = match outcome {
            Outcome::Done { mut artifacts } => artifacts.remove(0),
            other => panic!("expected DONE, got {:?}", other),
        };
        assert_eq!(artifact.item_count, 3);

        let lines = read_artifact(sink.artifact_path(&artifact.id).unwrap()).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["data"]["title"], "Card 3");
        assert_eq!(lines[0]["data"]["stage"], "in_development");
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = ExtractorConfig::new();
        config.source.page_size = PageSize::new(25).unwrap();
        config.rate_limit.default_delay_secs = 12;
        config.save(&config_path).unwrap();

        let loaded = ExtractorConfig::load(&config_path).unwrap();
        assert_eq!(loaded.source.page_size.get(), 25);
        assert_eq!(loaded.rate_limit.default_delay_secs, 12);
        assert!(validate_config_result(&loaded).is_ok());

        let settings = ExtractorSettings::from(&loaded);
        assert_eq!(settings.page_size.get(), 25);
        assert_eq!(settings.default_delay_secs, 12);
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "source:\n  page_size: 0\n").unwrap();

        assert!(ExtractorConfig::load(&config_path).is_err());
    }
}
