use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::Error;

/// Draws `N` bytes from the OS random source and encodes them as URL-safe
/// base64 without padding.
///
/// A failing random source is reported, never papered over with a weaker RNG.
pub(crate) fn url_safe_token<const N: usize>() -> Result<String, Error> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Random(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
