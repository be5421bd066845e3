use std::collections::HashSet;
use std::thread;

use pretty_assertions::assert_eq;

use canvas_core::{DocumentId, DocumentType, VersionSource};
use canvas_engine::{AgentUpdate, Engine, EngineError};
use canvas_storage::{SqliteStorage, VersionStore};
use canvas_harness::{TestCanvas, TestEngine};

fn numbers(engine: &TestEngine, id: DocumentId) -> Result<Vec<u64>, EngineError> {
    Ok(engine
        .list_versions(id)?
        .iter()
        .map(|summary| summary.number)
        .collect())
}

#[test]
fn documents_on_separate_threads_stay_contiguous() -> Result<(), Box<dyn std::error::Error>> {
    let canvas = TestCanvas::new()?;
    let engine = &canvas.engine;
    let docs = (0..4)
        .map(|i| {
            engine
                .create_document(DocumentType::Prose, None, &format!("doc {i}"), VersionSource::AiEdit)
                .map(|record| record.id)
        })
        .collect::<Result<Vec<_>, _>>()?;

    thread::scope(|scope| {
        for &doc in &docs {
            scope.spawn(move || {
                for round in 0..10 {
                    let outcome = engine.submit_agent_update(doc, &format!("{doc} round {round}"));
                    assert!(matches!(outcome, Ok(AgentUpdate::Applied(_))), "{outcome:?}");
                }
            });
        }
    });

    let expected: Vec<u64> = (1..=11).collect();
    for doc in docs {
        assert_eq!(numbers(engine, doc)?, expected);
    }

    Ok(())
}

#[test]
fn racing_agents_on_one_document_are_serialized() -> Result<(), Box<dyn std::error::Error>> {
    let canvas = TestCanvas::new()?;
    let engine = &canvas.engine;
    let doc = engine
        .create_document(DocumentType::Code, Some("rust"), "// start", VersionSource::AiEdit)?
        .id;

    thread::scope(|scope| {
        for agent in 0..4 {
            scope.spawn(move || {
                for step in 0..5 {
                    let outcome = engine.submit_agent_update(doc, &format!("// agent {agent} step {step}"));
                    assert!(matches!(outcome, Ok(AgentUpdate::Applied(_))), "{outcome:?}");
                }
            });
        }
    });

    let expected: Vec<u64> = (1..=21).collect();
    assert_eq!(numbers(engine, doc)?, expected);

    let contents: HashSet<String> = (2..=21)
        .map(|n| engine.get_version(doc, n))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .map(|version| version.content)
        .collect();
    assert_eq!(contents.len(), 20);

    Ok(())
}

#[test]
fn conflict_on_one_document_does_not_block_another() -> Result<(), Box<dyn std::error::Error>> {
    let mut canvas = TestCanvas::new()?;
    let blocked = canvas.document_with_history(&["X"])?;
    let free = canvas.document_with_history(&["A"])?;

    canvas.type_text(blocked, "Y")?;
    canvas.engine.submit_agent_update(blocked, "Z")?;

    let engine = &canvas.engine;
    thread::scope(|scope| {
        scope.spawn(move || {
            for step in 0..5 {
                let outcome = engine.submit_agent_update(free, &format!("A{step}"));
                assert!(matches!(outcome, Ok(AgentUpdate::Applied(_))), "{outcome:?}");
            }
        });
        scope.spawn(move || {
            let outcome = engine.submit_agent_update(blocked, "Z again");
            assert!(matches!(outcome, Err(EngineError::ConflictPending(_))), "{outcome:?}");
        });
    });

    assert_eq!(canvas.current_version(free)?, 6);
    assert_eq!(canvas.current_version(blocked)?, 1);
    assert!(canvas.engine.pending_conflict(blocked)?.is_some());

    Ok(())
}

#[test]
fn interleaved_user_and_agent_activity_never_loses_a_version() -> Result<(), Box<dyn std::error::Error>> {
    let canvas = TestCanvas::new()?;
    let engine = &canvas.engine;
    let doc = engine
        .create_document(DocumentType::Prose, None, "base", VersionSource::UserEdit)?
        .id;

    thread::scope(|scope| {
        scope.spawn(move || {
            for i in 0..20 {
                let _ = engine.submit_user_edit(doc, &format!("user {i}"));
                let _ = engine.flush_user_edit(doc);
            }
        });
        scope.spawn(move || {
            for i in 0..20 {
                match engine.submit_agent_update(doc, &format!("agent {i}")) {
                    Ok(_) => {}
                    Err(EngineError::ConflictPending(_)) => {
                        let _ = engine.resolve_conflict_str(doc, "merge");
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        });
    });

    // whatever the interleaving, the log has no gaps
    let listed = numbers(engine, doc)?;
    let current = engine.document_state(doc)?.document.current_version;
    let expected: Vec<u64> = (1..=current).collect();
    assert_eq!(listed, expected);

    Ok(())
}

#[test]
fn first_access_from_many_threads_shares_one_session() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStorage::open_in_memory()?;
    let (record, _) =
        store.create_document(DocumentType::Prose, None, "seed", VersionSource::AiEdit, None)?;
    let doc = record.id;
    // no session exists yet, so every thread races to load it
    let engine = Engine::new(store);
    let engine = &engine;

    thread::scope(|scope| {
        for agent in 0..8 {
            scope.spawn(move || {
                let outcome = engine.submit_agent_update(doc, &format!("agent {agent}"));
                assert!(matches!(outcome, Ok(AgentUpdate::Applied(_))), "{outcome:?}");
            });
        }
    });

    let state = engine.document_state(doc)?;
    assert_eq!(state.document.current_version, 9);
    assert_eq!(state.baseline_version, 9);
    assert_eq!(
        engine.get_document(doc)?.ok_or("document lost")?.current_version,
        9
    );

    Ok(())
}

#[test]
fn documents_picked_up_while_being_created_stay_in_step() -> Result<(), Box<dyn std::error::Error>> {
    let canvas = TestCanvas::new()?;
    let engine = &canvas.engine;

    thread::scope(|scope| {
        scope.spawn(move || {
            for i in 0..10 {
                let created =
                    engine.create_document(DocumentType::Prose, None, &format!("new {i}"), VersionSource::AiEdit);
                assert!(created.is_ok(), "{created:?}");
            }
        });
        scope.spawn(move || {
            for round in 0..50 {
                let Ok(records) = engine.list_documents() else {
                    continue;
                };
                for record in records {
                    let _ = engine.submit_agent_update(record.id, &format!("seen {round}"));
                }
            }
        });
    });

    // every session agrees with the store it writes to
    for record in engine.list_documents()? {
        let state = engine.document_state(record.id)?;
        assert_eq!(state.document.current_version, record.current_version);
        assert_eq!(state.baseline_version, record.current_version);
        assert_eq!(numbers(engine, record.id)?, (1..=record.current_version).collect::<Vec<_>>());
    }

    Ok(())
}
