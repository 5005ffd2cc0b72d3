//! JSON parsing collaborator

use serde::de::IgnoredAny;
use serde_json::Value;

/// Whether a body is syntactically valid JSON
pub fn is_valid_json(body: &str) -> bool {
    serde_json::from_str::<IgnoredAny>(body).is_ok()
}

/// Parse a body into a JSON value
pub fn parse_json(body: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_json() {
        assert!(is_valid_json(r#"[[],"14600000000000000"]"#));
        assert!(is_valid_json("1"));
        assert!(!is_valid_json("<html>"));
        assert!(!is_valid_json(""));
    }

    #[test]
    fn test_parse_json() {
        let value = parse_json(r#"[1,"Sent","15"]"#).expect("valid json");
        assert_eq!(value[1], "Sent");
        assert!(parse_json("{").is_err());
    }
}
