use crate::types::Descriptor;

/// Produces a face descriptor from some input (an image, a frame, a file).
///
/// `Ok(None)` means no face was found. That is a normal outcome, not an error.
pub trait Extractor {
    type Input: ?Sized;
    type Error: std::error::Error + Send + Sync + 'static;

    fn extract(&mut self, input: &Self::Input) -> Result<Option<Descriptor>, Self::Error>;

    /// Model identifier, e.g. "Facenet". Stored descriptors are only comparable
    /// when they come from the same model.
    fn model(&self) -> &str;
}
