pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod reconciler;
pub mod resolver;
pub mod session;

pub use buffer::{LocalEditBuffer, SettleTimer};
pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use events::CanvasEvent;
pub use history::{HistoryView, ViewPointer};
pub use reconciler::{AgentUpdate, SettleOutcome};
pub use resolver::{merge_contents, MERGE_SEPARATOR};
pub use session::{DocumentSession, DocumentState, SyncState};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use canvas_core::{
    Conflict, DocumentId, DocumentRecord, DocumentType, LineRange, ResolutionChoice, Version,
    VersionSource, VersionSummary,
};
use canvas_storage::{SqliteStorage, VersionStore};

use crate::events::EventHub;

type SessionHandle = Arc<Mutex<DocumentSession>>;

/// The versioning and conflict-resolution engine behind a shared canvas.
///
/// Sessions are loaded lazily per document and each sits behind its own
/// lock, so work on different documents never waits on another document's
/// reconciliation. Lock order is sessions map, then session, then store.
pub struct Engine<S = SqliteStorage> {
    store: Mutex<S>,
    sessions: Mutex<HashMap<DocumentId, SessionHandle>>,
    settle_window: Duration,
    events: EventHub,
}

impl Engine<SqliteStorage> {
    /// Open a SQLite-backed engine as described by `config`.
    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let storage = match &config.database_path {
            Some(path) => SqliteStorage::open(path)?,
            None => SqliteStorage::open_in_memory()?,
        };
        info!(
            database = ?config.database_path,
            settle_window_ms = config.settle_window().as_millis() as u64,
            "engine opened"
        );
        Ok(Self::with_config(storage, config))
    }
}

impl<S: VersionStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, &EngineConfig::default())
    }

    pub fn with_config(store: S, config: &EngineConfig) -> Self {
        Self {
            store: Mutex::new(store),
            sessions: Mutex::new(HashMap::new()),
            settle_window: config.settle_window(),
            events: EventHub::new(config.event_capacity),
        }
    }

    pub fn settle_window(&self) -> Duration {
        self.settle_window
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.events.subscribe()
    }

    /// Fetch the session for a document, loading it from the store on first use.
    /// The map lock is not held while loading; if two callers race, the
    /// first session inserted wins and the other load is dropped unused.
    fn session(&self, document_id: DocumentId) -> Result<SessionHandle, EngineError> {
        if let Some(session) = self.sessions.lock().get(&document_id) {
            return Ok(Arc::clone(session));
        }

        let (document, latest) = {
            let store = self.store.lock();
            (store.get_document(document_id)?, store.get_latest(document_id)?)
        };
        let (Some(document), Some(latest)) = (document, latest) else {
            return Err(EngineError::NotFound(format!("document {document_id}")));
        };

        debug!(%document_id, current_version = document.current_version, "session loaded");
        let loaded = DocumentSession::new(document, latest, self.settle_window);
        Ok(self.register(document_id, loaded))
    }

    fn register(&self, document_id: DocumentId, session: DocumentSession) -> SessionHandle {
        let mut sessions = self.sessions.lock();
        Arc::clone(
            sessions
                .entry(document_id)
                .or_insert_with(|| Arc::new(Mutex::new(session))),
        )
    }

    fn all_sessions(&self) -> Vec<SessionHandle> {
        self.sessions.lock().values().cloned().collect()
    }

    fn publish_appended(&self, version: &Version) {
        self.events.publish(CanvasEvent::VersionAppended {
            document_id: version.document_id,
            number: version.number,
            source: version.source,
        });
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Create a document with `content` as version 1.
    pub fn create_document(
        &self,
        document_type: DocumentType,
        language: Option<&str>,
        content: &str,
        source: VersionSource,
    ) -> Result<DocumentRecord, EngineError> {
        let (record, version) =
            self.store
                .lock()
                .create_document(document_type, language, content, source, None)?;
        info!(document_id = %record.id, document_type = document_type.as_str(), "document created");

        let session = DocumentSession::new(record.clone(), version.clone(), self.settle_window);
        self.register(record.id, session);
        self.publish_appended(&version);
        Ok(record)
    }

    pub fn get_document(&self, document_id: DocumentId) -> Result<Option<DocumentRecord>, EngineError> {
        Ok(self.store.lock().get_document(document_id)?)
    }

    pub fn list_documents(&self) -> Result<Vec<DocumentRecord>, EngineError> {
        Ok(self.store.lock().list_documents()?)
    }

    pub fn get_latest_content(&self, document_id: DocumentId) -> Result<Option<String>, EngineError> {
        Ok(self
            .store
            .lock()
            .get_latest(document_id)?
            .map(|version| version.content))
    }

    pub fn get_version(
        &self,
        document_id: DocumentId,
        number: u64,
    ) -> Result<Option<Version>, EngineError> {
        Ok(self.store.lock().get_version(document_id, number)?)
    }

    /// History list for a document, ascending. Empty for unknown documents.
    pub fn list_versions(&self, document_id: DocumentId) -> Result<Vec<VersionSummary>, EngineError> {
        let versions = self.store.lock().list_versions(document_id)?;
        Ok(versions.iter().map(Version::summary).collect())
    }

    /// Pull-side view of a document's engine state.
    pub fn document_state(&self, document_id: DocumentId) -> Result<DocumentState, EngineError> {
        let session = self.session(document_id)?;
        let session = session.lock();
        Ok(session.snapshot())
    }

    // ========================================================================
    // Local Edits
    // ========================================================================

    pub fn submit_user_edit(&self, document_id: DocumentId, content: &str) -> Result<(), EngineError> {
        self.submit_user_edit_at(document_id, content, Instant::now())
    }

    /// Like `submit_user_edit` with an explicit clock reading.
    pub fn submit_user_edit_at(
        &self,
        document_id: DocumentId,
        content: &str,
        now: Instant,
    ) -> Result<(), EngineError> {
        let session = self.session(document_id)?;
        session.lock().buffer.edit(content, now);
        Ok(())
    }

    /// Drop an unsettled local edit. Nothing is persisted.
    pub fn discard_user_edit(&self, document_id: DocumentId) -> Result<(), EngineError> {
        let session = self.session(document_id)?;
        session.lock().buffer.discard();
        Ok(())
    }

    /// Settle a document's buffer immediately, ignoring the quiet window.
    /// `None` when there was nothing to persist.
    pub fn flush_user_edit(&self, document_id: DocumentId) -> Result<Option<Version>, EngineError> {
        let session = self.session(document_id)?;
        let mut session = session.lock();
        match session.buffer.force_settle() {
            Some(content) => self.settle(&mut session, content),
            None => Ok(None),
        }
    }

    pub fn poll_settled(&self) -> Vec<(DocumentId, Result<Version, EngineError>)> {
        self.poll_settled_at(Instant::now())
    }

    /// Run the settle step for every buffer whose quiet window has elapsed
    /// by `now`. Returns one entry per attempted write; a failed write leaves
    /// its buffer pending so a later poll retries it.
    pub fn poll_settled_at(&self, now: Instant) -> Vec<(DocumentId, Result<Version, EngineError>)> {
        let mut written = Vec::new();
        for handle in self.all_sessions() {
            let mut session = handle.lock();
            let Some(content) = session.buffer.take_settled(now) else {
                continue;
            };
            let document_id = session.document_id();
            match self.settle(&mut session, content) {
                Ok(Some(version)) => written.push((document_id, Ok(version))),
                Ok(None) => {}
                Err(e) => written.push((document_id, Err(e))),
            }
        }
        written
    }

    /// Earliest instant at which some buffer will settle.
    pub fn next_settle_deadline(&self) -> Option<Instant> {
        self.all_sessions()
            .iter()
            .filter_map(|handle| handle.lock().buffer.settle_deadline())
            .min()
    }

    fn settle(
        &self,
        session: &mut DocumentSession,
        content: String,
    ) -> Result<Option<Version>, EngineError> {
        match reconciler::on_settle(session, &self.store, content)? {
            SettleOutcome::Persisted(version) => {
                self.publish_appended(&version);
                Ok(Some(version))
            }
            SettleOutcome::Captured => {
                if let Some(conflict) = session.state.pending_conflict() {
                    self.events.publish(CanvasEvent::ConflictUpdated {
                        document_id: session.document_id(),
                        base_version: conflict.base_version,
                    });
                }
                Ok(None)
            }
            SettleOutcome::ConflictCleared(version) => {
                self.publish_appended(&version);
                self.events.publish(CanvasEvent::ConflictResolved {
                    document_id: version.document_id,
                    choice: ResolutionChoice::Ai,
                    number: version.number,
                });
                Ok(Some(version))
            }
        }
    }

    // ========================================================================
    // Agent Updates & Conflicts
    // ========================================================================

    pub fn submit_agent_update(
        &self,
        document_id: DocumentId,
        content: &str,
    ) -> Result<AgentUpdate, EngineError> {
        self.submit_agent_update_with_hint(document_id, content, None)
    }

    /// Feed agent output into a document. `line_range` is carried into any
    /// conflict raised; without it the diverging lines are computed.
    pub fn submit_agent_update_with_hint(
        &self,
        document_id: DocumentId,
        content: &str,
        line_range: Option<LineRange>,
    ) -> Result<AgentUpdate, EngineError> {
        let session = self.session(document_id)?;
        let mut session = session.lock();
        let outcome = reconciler::on_agent_update(&mut session, &self.store, content, line_range)?;
        match &outcome {
            AgentUpdate::Applied(version) => self.publish_appended(version),
            AgentUpdate::Unchanged(_) => {}
            AgentUpdate::Conflict(conflict) => self.events.publish(CanvasEvent::ConflictRaised {
                document_id,
                base_version: conflict.base_version,
            }),
        }
        Ok(outcome)
    }

    pub fn pending_conflict(&self, document_id: DocumentId) -> Result<Option<Conflict>, EngineError> {
        let session = self.session(document_id)?;
        let session = session.lock();
        Ok(session.state.pending_conflict().cloned())
    }

    pub fn resolve_conflict(
        &self,
        document_id: DocumentId,
        choice: ResolutionChoice,
    ) -> Result<Version, EngineError> {
        let session = self.session(document_id)?;
        let mut session = session.lock();
        let version = resolver::resolve(&mut session, &self.store, choice)?;
        self.publish_appended(&version);
        self.events.publish(CanvasEvent::ConflictResolved {
            document_id,
            choice,
            number: version.number,
        });
        Ok(version)
    }

    /// Resolve with a choice given as `"user"`, `"ai"` or `"merge"`.
    pub fn resolve_conflict_str(
        &self,
        document_id: DocumentId,
        choice: &str,
    ) -> Result<Version, EngineError> {
        let choice: ResolutionChoice = choice
            .parse()
            .map_err(|e: canvas_core::CoreError| EngineError::InvalidResolution(e.to_string()))?;
        self.resolve_conflict(document_id, choice)
    }

    // ========================================================================
    // History Navigation
    // ========================================================================

    pub fn history_view(&self, document_id: DocumentId) -> Result<HistoryView, EngineError> {
        let session = self.session(document_id)?;
        let session = session.lock();
        Ok(session.history_view())
    }

    pub fn undo(&self, document_id: DocumentId) -> Result<Version, EngineError> {
        self.navigate(document_id, |pointer, current| Some(pointer.undo(current)))
    }

    pub fn redo(&self, document_id: DocumentId) -> Result<Version, EngineError> {
        self.navigate(document_id, |pointer, current| Some(pointer.redo(current)))
    }

    pub fn jump_to(&self, document_id: DocumentId, number: u64) -> Result<Version, EngineError> {
        self.navigate(document_id, |_, current| ViewPointer::jump(number, current))
    }

    pub fn view_latest(&self, document_id: DocumentId) -> Result<Version, EngineError> {
        self.navigate(document_id, |_, _| Some(ViewPointer::Latest))
    }

    /// Move the view pointer and read the version it lands on. The store is
    /// only read; the pointer changes only if that read succeeds.
    fn navigate(
        &self,
        document_id: DocumentId,
        step: impl FnOnce(ViewPointer, u64) -> Option<ViewPointer>,
    ) -> Result<Version, EngineError> {
        let session = self.session(document_id)?;
        let mut session = session.lock();
        let current = session.current_version();

        let pointer = step(session.view, current)
            .ok_or_else(|| EngineError::NotFound(format!("version out of range for document {document_id}")))?;
        let viewed = pointer.viewed(current);
        let version = self
            .store
            .lock()
            .get_version(document_id, viewed)?
            .ok_or_else(|| EngineError::NotFound(format!("version {viewed} of document {document_id}")))?;

        session.view = pointer;
        let view = session.history_view();
        debug!(%document_id, viewed, current, "view moved");
        self.events.publish(CanvasEvent::ViewChanged {
            document_id,
            viewed_version: view.viewed_version,
            is_viewing_old_version: view.is_viewing_old_version,
        });
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_doc(content: &str) -> (Engine, DocumentId) {
        let engine = Engine::new(SqliteStorage::open_in_memory().unwrap());
        let record = engine
            .create_document(DocumentType::Prose, None, content, VersionSource::AiEdit)
            .unwrap();
        (engine, record.id)
    }

    #[test]
    fn unknown_document_is_not_found() {
        let engine = Engine::new(SqliteStorage::open_in_memory().unwrap());
        let id = DocumentId::new();
        assert!(engine.get_document(id).unwrap().is_none());
        assert!(engine.get_latest_content(id).unwrap().is_none());
        assert!(matches!(
            engine.submit_agent_update(id, "x"),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(engine.undo(id), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn sessions_reload_from_existing_store() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        let (record, _) = store
            .create_document(DocumentType::Code, Some("rust"), "fn a() {}", VersionSource::AiEdit, None)
            .unwrap();
        store
            .append(record.id, "fn b() {}", VersionSource::UserEdit, None)
            .unwrap();

        let engine = Engine::new(store);
        let state = engine.document_state(record.id).unwrap();
        assert_eq!(state.baseline_version, 2);
        assert_eq!(state.buffer_content, "fn b() {}");
        assert!(!state.is_dirty);
        assert_eq!(state.document.language.as_deref(), Some("rust"));
    }

    #[test]
    fn settle_persists_user_edit_after_quiet_window() {
        let (engine, id) = engine_with_doc("X");
        let t0 = Instant::now();
        engine.submit_user_edit_at(id, "Y", t0).unwrap();

        assert!(engine.poll_settled_at(t0 + Duration::from_millis(100)).is_empty());
        assert_eq!(engine.next_settle_deadline(), Some(t0 + engine.settle_window()));

        let written = engine.poll_settled_at(t0 + Duration::from_millis(600));
        assert_eq!(written.len(), 1);
        let version = written[0].1.as_ref().unwrap();
        assert_eq!(version.number, 2);
        assert_eq!(version.source, VersionSource::UserEdit);
        assert_eq!(engine.next_settle_deadline(), None);
    }

    #[test]
    fn flush_on_clean_buffer_writes_nothing() {
        let (engine, id) = engine_with_doc("X");
        assert_eq!(engine.flush_user_edit(id).unwrap(), None);
        assert_eq!(engine.list_versions(id).unwrap().len(), 1);
    }

    #[test]
    fn unknown_choice_string_is_invalid_resolution() {
        let (engine, id) = engine_with_doc("X");
        engine.submit_user_edit(id, "Y").unwrap();
        engine.submit_agent_update(id, "Z").unwrap();

        let result = engine.resolve_conflict_str(id, "both");
        assert!(matches!(result, Err(EngineError::InvalidResolution(_))));
        // the conflict is still there for a valid choice
        assert!(engine.pending_conflict(id).unwrap().is_some());
        let version = engine.resolve_conflict_str(id, "ai").unwrap();
        assert_eq!(version.content, "Z");
    }

    #[test]
    fn navigation_emits_view_events() {
        let (engine, id) = engine_with_doc("v1");
        engine.submit_agent_update(id, "v2").unwrap();
        let mut rx = engine.subscribe();

        let version = engine.undo(id).unwrap();
        assert_eq!(version.number, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            CanvasEvent::ViewChanged {
                document_id: id,
                viewed_version: 1,
                is_viewing_old_version: true,
            }
        );
    }

    #[test]
    fn errors_report_retryability() {
        use canvas_storage::StorageError;

        assert!(EngineError::ConflictPending(DocumentId::new()).is_retryable());
        assert!(!EngineError::InvalidResolution("x".into()).is_retryable());
        assert!(!EngineError::NotFound("x".into()).is_retryable());

        let io = StorageError::Io(std::io::Error::other("disk full"));
        assert!(EngineError::Persistence(io).is_retryable());
        let integrity = StorageError::Integrity {
            document_id: "d".into(),
            number: 2,
        };
        assert!(!EngineError::Persistence(integrity).is_retryable());
        let missing = StorageError::DocumentNotFound("d".into());
        assert!(!EngineError::Persistence(missing).is_retryable());
        let clash = StorageError::ConstraintViolation("dup".into());
        assert!(!EngineError::Persistence(clash).is_retryable());
    }

    #[test]
    fn racing_loads_share_the_first_registered_session() {
        let engine = Engine::new(SqliteStorage::open_in_memory().unwrap());
        let id = DocumentId::new();
        let fresh = |content: &str| {
            let record = canvas_core::DocumentRecord {
                id,
                document_type: DocumentType::Prose,
                language: None,
                current_version: 1,
            };
            let version = Version {
                document_id: id,
                number: 1,
                content: content.into(),
                source: VersionSource::AiEdit,
                note: None,
                created_at: canvas_core::version::now_millis(),
            };
            DocumentSession::new(record, version, engine.settle_window())
        };

        let first = engine.register(id, fresh("first"));
        first.lock().buffer.edit("typing", Instant::now());
        let second = engine.register(id, fresh("second"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().buffer.content(), "typing");
    }
}
