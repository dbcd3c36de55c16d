use crate::error::Error;

/// Opaque "value -> image bytes" collaborator. Must be deterministic:
/// encoding the same value twice yields an equivalent image.
pub trait QrEncoder: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn encode(&self, value: &str) -> Result<Vec<u8>, Error>;
}
