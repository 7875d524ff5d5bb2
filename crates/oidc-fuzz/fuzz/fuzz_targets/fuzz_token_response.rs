#![no_main]

use libfuzzer_sys::fuzz_target;
use oidc_client::oauth::TokenResponse;

fuzz_target!(|data: &[u8]| {
    if let Ok(tokens) = serde_json::from_slice::<TokenResponse>(data) {
        // Large expires_in values must not overflow
        let _ = tokens.expires_at();
        let _ = format!("{tokens:?}");
    }
});
