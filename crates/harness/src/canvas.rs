use std::time::{Duration, Instant};

use canvas_core::{DocumentId, DocumentType, Version, VersionSource};
use canvas_engine::{AgentUpdate, Engine, EngineConfig, EngineError};
use canvas_storage::{SqliteStorage, StorageError};

use crate::flaky::{FailureSwitch, FlakyStore};

pub type TestEngine = Engine<FlakyStore<SqliteStorage>>;

/// An in-memory engine with a hand-driven clock and a failure switch.
pub struct TestCanvas {
    pub engine: TestEngine,
    pub failures: FailureSwitch,
    now: Instant,
}

impl TestCanvas {
    pub fn new() -> Result<Self, StorageError> {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Result<Self, StorageError> {
        let (store, failures) = FlakyStore::new(SqliteStorage::open_in_memory()?);
        Ok(Self {
            engine: Engine::with_config(store, config),
            failures,
            now: Instant::now(),
        })
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Create a prose document whose history is exactly `contents`, one
    /// agent-written version per entry.
    pub fn document_with_history(
        &mut self,
        contents: &[&str],
    ) -> Result<DocumentId, Box<dyn std::error::Error>> {
        let (first, rest) = contents
            .split_first()
            .ok_or("a document needs at least one version")?;
        let record =
            self.engine
                .create_document(DocumentType::Prose, None, first, VersionSource::AiEdit)?;
        for content in rest {
            match self.engine.submit_agent_update(record.id, content)? {
                AgentUpdate::Applied(_) => {}
                other => return Err(format!("expected a clean apply, got {other:?}").into()),
            }
        }
        Ok(record.id)
    }

    /// A keystroke at the current clock reading.
    pub fn type_text(&mut self, document_id: DocumentId, content: &str) -> Result<(), EngineError> {
        self.engine.submit_user_edit_at(document_id, content, self.now)
    }

    /// Let the quiet window pass and run the settle step.
    pub fn settle(&mut self) -> Vec<(DocumentId, Result<Version, EngineError>)> {
        self.advance(self.engine.settle_window() + Duration::from_millis(1));
        self.engine.poll_settled_at(self.now)
    }

    pub fn current_version(&self, document_id: DocumentId) -> Result<u64, EngineError> {
        Ok(self.engine.document_state(document_id)?.document.current_version)
    }
}
