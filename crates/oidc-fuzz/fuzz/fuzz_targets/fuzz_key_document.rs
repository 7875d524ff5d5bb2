#![no_main]

use libfuzzer_sys::fuzz_target;
use oidc_client::oidc::SigningKeySet;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = std::str::from_utf8(data) {
        if let Ok(set) = SigningKeySet::from_document(body) {
            // A parsed set is never empty
            assert!(!set.is_empty());
            let _ = set.get(None);
        }
    }
});
