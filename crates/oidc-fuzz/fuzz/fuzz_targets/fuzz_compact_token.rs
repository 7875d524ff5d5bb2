#![no_main]

use libfuzzer_sys::fuzz_target;
use oidc_client::oidc::CompactToken;

fuzz_target!(|data: &[u8]| {
    // Arbitrary text as an identity token: Ok or MalformedToken, never a panic
    if let Ok(token) = std::str::from_utf8(data) {
        if let Ok(parsed) = CompactToken::parse(token) {
            let _ = parsed.algorithm();
        }
    }
});
