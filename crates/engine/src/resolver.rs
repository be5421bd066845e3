use parking_lot::Mutex;
use tracing::info;

use canvas_core::{Conflict, ResolutionChoice, Version, VersionSource};
use canvas_storage::VersionStore;

use crate::error::EngineError;
use crate::reconciler::append;
use crate::session::{DocumentSession, SyncState};

/// Literal line placed between the two sides of a merge. Downstream
/// consumers parse this exact format.
pub const MERGE_SEPARATOR: &str = "\n\n---\n\n";

/// User content first, then the separator, then agent content.
pub fn merge_contents(user_content: &str, ai_content: &str) -> String {
    let mut merged =
        String::with_capacity(user_content.len() + MERGE_SEPARATOR.len() + ai_content.len());
    merged.push_str(user_content);
    merged.push_str(MERGE_SEPARATOR);
    merged.push_str(ai_content);
    merged
}

pub fn resolved_content(conflict: &Conflict, choice: ResolutionChoice) -> String {
    match choice {
        ResolutionChoice::User => conflict.user_content.clone(),
        ResolutionChoice::Ai => conflict.ai_content.clone(),
        ResolutionChoice::Merge => merge_contents(&conflict.user_content, &conflict.ai_content),
    }
}

pub fn resolution_note(choice: ResolutionChoice) -> String {
    format!("Conflict resolved: {choice}")
}

pub(crate) fn resolve<S: VersionStore>(
    session: &mut DocumentSession,
    store: &Mutex<S>,
    choice: ResolutionChoice,
) -> Result<Version, EngineError> {
    let document_id = session.document_id();
    let Some(conflict) = session.state.pending_conflict() else {
        return Err(EngineError::InvalidResolution(format!(
            "no pending conflict on document {document_id}"
        )));
    };

    let content = resolved_content(conflict, choice);
    let note = resolution_note(choice);
    let version = append(
        store,
        session,
        &content,
        VersionSource::ConflictResolution,
        Some(&note),
    )?;

    session.record_appended(&version);
    session.buffer.reset_to(version.clone());
    session.state = SyncState::Idle;
    info!(%document_id, number = version.number, choice = choice.as_str(), "conflict resolved");
    Ok(version)
}
