use std::path::Path;

use async_trait::async_trait;

use crate::domain::ExtractedDocument;
use crate::error::Result;

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    fn supports(&self, path: &Path) -> bool;

    /// Fails with `NotFound` for a missing path and `Format` for an
    /// unsupported extension or undecodable content.
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument>;
}
