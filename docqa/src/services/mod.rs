mod cancel;
pub mod chat;
pub mod chunker;
pub mod ingestion;
pub mod retrieval;

pub use cancel::CancelFlag;
pub use chat::{ChatAnswer, ChatService, StreamGate, StreamingAnswer};
pub use chunker::Chunker;
pub use ingestion::{FileWarning, IngestEvent, IngestionReport, IngestionService};
pub use retrieval::{Retriever, format_context, get_relevant_sources};
