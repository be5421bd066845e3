//! Decides what happens when agent output or a settled local edit arrives.
//!
//! Every function here runs with the document's session lock held. The store
//! is locked only around the single `append`, and session state is touched
//! only after that append succeeds, so a failed write changes nothing.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use canvas_core::{
    conflict::changed_line_range, Conflict, LineRange, Version, VersionSource,
};
use canvas_storage::VersionStore;

use crate::error::EngineError;
use crate::session::{DocumentSession, SyncState};

/// Result of feeding agent output into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentUpdate {
    /// Written as a new `ai_edit` version.
    Applied(Version),
    /// Identical to the baseline; nothing written.
    Unchanged(Version),
    /// Diverges from unsaved local edits; the document now awaits resolution.
    Conflict(Conflict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    Persisted(Version),
    /// Folded into the pending conflict's user side.
    Captured,
    /// The settled text matched the agent side, so the conflict is gone and
    /// the agent content was written as an `ai_edit`.
    ConflictCleared(Version),
}

pub(crate) fn append<S: VersionStore>(
    store: &Mutex<S>,
    session: &DocumentSession,
    content: &str,
    source: VersionSource,
    note: Option<&str>,
) -> Result<Version, EngineError> {
    let document_id = session.document_id();
    let version = store
        .lock()
        .append(document_id, content, source, note)
        .inspect_err(|e| warn!(%document_id, source = source.as_str(), error = %e, "append failed"))?;
    info!(%document_id, number = version.number, source = source.as_str(), "version appended");
    Ok(version)
}

pub(crate) fn on_agent_update<S: VersionStore>(
    session: &mut DocumentSession,
    store: &Mutex<S>,
    ai_content: &str,
    hint: Option<LineRange>,
) -> Result<AgentUpdate, EngineError> {
    let document_id = session.document_id();
    if !session.state.is_idle() {
        debug!(%document_id, "agent update rejected, conflict pending");
        return Err(EngineError::ConflictPending(document_id));
    }

    let baseline = session.buffer.baseline();
    let base_version = baseline.number;
    if ai_content == baseline.content {
        debug!(%document_id, base_version, "agent update matches baseline");
        return Ok(AgentUpdate::Unchanged(baseline.clone()));
    }

    if !session.buffer.is_dirty() {
        let version = append(store, session, ai_content, VersionSource::AiEdit, None)?;
        session.record_appended(&version);
        session.buffer.adopt_baseline(version.clone());
        return Ok(AgentUpdate::Applied(version));
    }

    if session.buffer.content() == ai_content {
        // The user typed exactly what the agent produced: one version, no conflict.
        let version = append(store, session, ai_content, VersionSource::AiEdit, None)?;
        session.record_appended(&version);
        session.buffer.reset_to(version.clone());
        return Ok(AgentUpdate::Applied(version));
    }

    let user_content = session.buffer.content().to_string();
    let line_range = hint.or_else(|| changed_line_range(&user_content, ai_content));
    let description = match line_range {
        Some(range) => format!("Agent update overlaps unsaved local edits ({range})"),
        None => "Agent update overlaps unsaved local edits".to_string(),
    };
    let conflict = Conflict {
        description,
        base_version,
        user_content,
        ai_content: ai_content.to_string(),
        line_range,
    };
    warn!(%document_id, base_version = conflict.base_version, "conflict raised");
    session.state = SyncState::AwaitingResolution(conflict.clone());
    Ok(AgentUpdate::Conflict(conflict))
}

pub(crate) fn on_settle<S: VersionStore>(
    session: &mut DocumentSession,
    store: &Mutex<S>,
    content: String,
) -> Result<SettleOutcome, EngineError> {
    let document_id = session.document_id();
    let matches_agent = match &session.state {
        SyncState::Idle => None,
        SyncState::AwaitingResolution(conflict) => Some(conflict.ai_content == content),
    };

    match matches_agent {
        Some(true) => {
            // Both sides now agree: same outcome as the user typing the agent's text.
            let version = append(store, session, &content, VersionSource::AiEdit, None)?;
            session.record_appended(&version);
            session.buffer.reset_to(version.clone());
            session.state = SyncState::Idle;
            info!(%document_id, number = version.number, "conflict cleared by matching local edit");
            return Ok(SettleOutcome::ConflictCleared(version));
        }
        Some(false) => {
            if let SyncState::AwaitingResolution(conflict) = &mut session.state {
                conflict.user_content = content;
            }
            session.buffer.acknowledge();
            debug!(%document_id, "settled edit captured into pending conflict");
            return Ok(SettleOutcome::Captured);
        }
        None => {}
    }

    let version = append(store, session, &content, VersionSource::UserEdit, None)?;
    session.record_appended(&version);
    session.buffer.commit(version.clone());
    Ok(SettleOutcome::Persisted(version))
}
