pub mod nlm;
pub mod pdf;

use crate::error::ExtractionError;
use crate::task::ExtractionResult;

pub use nlm::{DocumentMetadata, NlmWriter};
pub use pdf::PdfMetadataEngine;

/// Turns raw document bytes into structured metadata.
///
/// Implementations may be slow and CPU-bound; the task core only ever calls
/// them from worker threads.
pub trait ExtractionEngine: Send + Sync {
    fn extract(&self, content: &[u8], filename: &str) -> Result<ExtractionResult, ExtractionError>;
}

impl<F> ExtractionEngine for F
where
    F: Fn(&[u8], &str) -> Result<ExtractionResult, ExtractionError> + Send + Sync,
{
    fn extract(&self, content: &[u8], filename: &str) -> Result<ExtractionResult, ExtractionError> {
        self(content, filename)
    }
}
