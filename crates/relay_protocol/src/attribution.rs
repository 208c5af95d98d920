//! Cross-mesh attribution formatting and parsing (spec C9, §4.6, §4.7, §8).
//!
//! Outbound mesh text that did not originate on our own mesh is wrapped as
//! `"[<name>/<meshnet>]: <body>"` so a relay on the far side of another
//! bridge can recognize it and avoid re-wrapping or looping it back.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttributionError {
    #[error("meshnet name {0:?} contains '/' or ']', which would make attribution ambiguous")]
    AmbiguousMeshnetName(String),
    #[error("display name {0:?} contains '/' or ']', which would make attribution ambiguous")]
    AmbiguousDisplayName(String),
}

fn is_ambiguous(s: &str) -> bool {
    s.contains('/') || s.contains(']')
}

/// Format `"[<name>/<meshnet>]: <body>"`. Errors if `name` or `meshnet`
/// contain `/` or `]`, since that would make the result unparseable.
pub fn format_attribution(name: &str, meshnet: &str, body: &str) -> Result<String, AttributionError> {
    if is_ambiguous(meshnet) {
        return Err(AttributionError::AmbiguousMeshnetName(meshnet.to_string()));
    }
    if is_ambiguous(name) {
        return Err(AttributionError::AmbiguousDisplayName(name.to_string()));
    }
    Ok(format!("[{}/{}]: {}", name, meshnet, body))
}

/// Parse `"[<name>/<meshnet>]: <body>"` back into its parts.
///
/// Returns `None` if the text doesn't match the attribution shape at all
/// (most inbound mesh text won't). This is the exact inverse of
/// [`format_attribution`] for any `name`/`meshnet` that contain neither `/`
/// nor `]` (spec §8 testable property).
pub fn parse_attribution(text: &str) -> Option<(String, String, String)> {
    let rest = text.strip_prefix('[')?;
    let close = rest.find(']')?;
    let header = &rest[..close];
    let slash = header.find('/')?;
    let name = &header[..slash];
    let meshnet = &header[slash + 1..];
    let after = rest.get(close + 1..)?;
    let body = after.strip_prefix(": ")?;
    Some((name.to_string(), meshnet.to_string(), body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse_is_identity() {
        let formatted = format_attribution("Bob", "M2", "yo").unwrap();
        assert_eq!(formatted, "[Bob/M2]: yo");
        assert_eq!(
            parse_attribution(&formatted),
            Some(("Bob".to_string(), "M2".to_string(), "yo".to_string()))
        );
    }

    #[test]
    fn format_rejects_ambiguous_meshnet() {
        assert!(format_attribution("Bob", "M/2", "yo").is_err());
    }

    #[test]
    fn format_rejects_ambiguous_name() {
        assert!(format_attribution("Bo]b", "M2", "yo").is_err());
    }

    #[test]
    fn parse_rejects_plain_text() {
        assert_eq!(parse_attribution("hello there"), None);
    }

    #[test]
    fn parse_handles_body_containing_brackets() {
        let (name, meshnet, body) = parse_attribution("[Bob/M2]: [ok] yo").unwrap();
        assert_eq!(name, "Bob");
        assert_eq!(meshnet, "M2");
        assert_eq!(body, "[ok] yo");
    }
}
