pub mod chunk;
pub mod document;
pub mod id;
pub mod search;
pub mod session;

pub use chunk::{Chunk, ChunkStrategy, EmbeddedChunk, Metadata};
pub use document::ExtractedDocument;
pub use id::{DocId, SessionId};
pub use search::{ContextBlock, IndexStats, SearchQuery, SearchResult};
pub use session::{ChatMessage, Role, Session};
