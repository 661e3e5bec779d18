pub mod embed;
pub mod extract;
pub mod generate;
pub mod index;

pub use embed::EmbeddingGateway;
pub use extract::DocumentExtractor;
pub use generate::{AnswerGenerator, GenerationRequest};
pub use index::VectorIndex;
