use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand_core::TryRngCore;

use crate::Error;

/// Raw entropy per token string.
pub const TOKEN_BYTES: usize = 32;

/// Generates an unguessable token string: 32 bytes from the OS RNG,
/// base64 URL-safe without padding (43 characters, URL path safe).
///
/// Uniqueness comes from the entropy; there is no collision retry.
pub fn generate_token_string() -> Result<String, Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    let mut rng = OsRng;
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| Error::TokenGeneration(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
