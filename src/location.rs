// Copyright 2025 Oxide Computer Company

//! JSON pointer tracking for attributing changes and errors to a document
//! location.

use std::fmt;

/// A location within an OpenAPI document, as a JSON pointer (`#/paths/...`).
///
/// The path is extended with [`append`](Self::append) while walking inline
/// structures and replaced wholesale with [`jump`](Self::jump) when a `$ref`
/// is followed, since a reference target is addressed from the document root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JsonPath {
    pointer: String,
}

impl JsonPath {
    /// The document root, rendered as `#`.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn append(&self, segment: &str) -> Self {
        let mut pointer = self.pointer.clone();
        pointer.push('/');
        pointer.push_str(&escape_segment(segment));
        Self { pointer }
    }

    /// Move to a reference target. `reference` must be a fragment pointer
    /// starting with `#/`; the caller validates this before following it.
    pub fn jump(&self, reference: &str) -> Self {
        Self {
            pointer: reference.trim_start_matches('#').to_string(),
        }
    }

    /// The pointer without the leading `#`, suitable for
    /// `serde_json::Value::pointer`.
    pub fn pointer(&self) -> &str {
        &self.pointer
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.pointer)
    }
}

// Escaping per RFC 6901: `~` then `/`.
fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use crate::location::JsonPath;

    #[test]
    fn test_append() {
        let path = JsonPath::root().append("paths").append("/pets").append("get");
        assert_eq!(path.to_string(), "#/paths/~1pets/get");
        assert_eq!(path.pointer(), "/paths/~1pets/get");
    }

    #[test]
    fn test_escapes() {
        let path = JsonPath::root().append("a~b/c");
        assert_eq!(path.to_string(), "#/a~0b~1c");
    }

    #[test]
    fn test_jump() {
        let path = JsonPath::root().append("paths").append("/pets");
        let jumped = path.jump("#/components/schemas/Pet");
        assert_eq!(jumped.to_string(), "#/components/schemas/Pet");
        assert_eq!(jumped.pointer(), "/components/schemas/Pet");
    }
}
