use serde::Serialize;

use crate::auth::sha256_hex;

/// Cache key for a completion request: SHA-256 over its JSON form, so
/// identical prompts with identical options share an entry.
pub fn completion_key<T: Serialize>(request: &T) -> String {
    let payload = serde_json::to_string(request).unwrap_or_default();
    format!("completion:{}", sha256_hex(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_request_same_key() {
        let a = completion_key(&serde_json::json!({ "messages": ["hi"], "temperature": 0.2 }));
        let b = completion_key(&serde_json::json!({ "messages": ["hi"], "temperature": 0.2 }));
        let c = completion_key(&serde_json::json!({ "messages": ["hi"], "temperature": 0.9 }));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("completion:"));
    }
}
