pub mod conflict;
pub mod document;
pub mod error;
pub mod ids;
pub mod version;

pub use conflict::{Conflict, LineRange, ResolutionChoice};
pub use document::{DocumentRecord, DocumentType};
pub use error::CoreError;
pub use ids::*;
pub use version::{Version, VersionSource, VersionSummary};
