mod codec;
mod directory;
mod errors;
mod index;
mod models;
mod store;
mod tags;

pub use directory::DirectoryAccess;
pub use errors::{StoreError, StoreResult};
pub use models::{CreateNoteRequest, Note, NoteIndex, NoteSummary, Section, SectionKind};
pub use store::NoteStore;

/// Install the default subscriber: fmt output, `RUST_LOG`-style filtering,
/// `info` when nothing is set. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
