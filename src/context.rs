// Copyright 2025 Oxide Computer Company

use std::{borrow::Cow, ops::Deref};

use openapiv3::ReferenceOr;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{location::JsonPath, resolve::ReferenceOrResolver};

/// Whether a schema describes data a client sends or a server emits.
/// Compatibility rules invert between the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Request,
    Response,
}

/// The context in force for one recursive schema comparison: the position and
/// whether the value under comparison is required by its parent.
///
/// Created once per top-level comparison and threaded unchanged through the
/// recursion, except `required`, which is recomputed per property from the
/// parent's (right-hand) `required` list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiffContext {
    pub position: Position,
    pub required: bool,
}

impl DiffContext {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            required: false,
        }
    }

    pub fn with_required(self, required: bool) -> Self {
        Self { required, ..self }
    }

    /// A property that can never appear on the wire in this direction is
    /// excluded from change accounting: writeOnly data never appears in a
    /// response, readOnly data never appears in a request.
    pub fn is_irrelevant(&self, read_only: bool, write_only: bool) -> bool {
        match self.position {
            Position::Request => read_only,
            Position::Response => write_only,
        }
    }
}

/// A borrowed raw document plus the current location within it.
///
/// The raw [`Value`] is what `$ref` pointers are resolved against; it is
/// read-only for the whole run.
#[derive(Clone, Debug)]
pub struct Context<'a> {
    pub raw_document: &'a Value,
    pub path: JsonPath,
}

impl<'a> Context<'a> {
    pub fn new(raw_document: &'a Value) -> Self {
        Self {
            raw_document,
            path: JsonPath::root(),
        }
    }

    pub fn append(&self, segment: &str) -> Context<'a> {
        Self {
            raw_document: self.raw_document,
            path: self.path.append(segment),
        }
    }

    pub(crate) fn jump(&self, reference: &str) -> Context<'a> {
        Self {
            raw_document: self.raw_document,
            path: self.path.jump(reference),
        }
    }
}

/// A value paired with the context it was found in.
#[derive(Clone)]
pub struct Contextual<'a, T> {
    context: Context<'a>,
    value: T,
}

impl<'a, T> Contextual<'a, T> {
    pub fn new(context: Context<'a>, value: T) -> Self {
        Self { context, value }
    }

    pub fn append_deref<'s, S>(&'s self, field: &'s S, segment: &str) -> Contextual<'a, &'s S> {
        Contextual {
            context: self.context.append(segment),
            value: field,
        }
    }

    /// Wrap a field that lives at the same document location as its parent.
    pub fn subcomponent<'s, S>(&'s self, field: &'s S) -> Contextual<'a, &'s S> {
        Contextual {
            context: self.context.clone(),
            value: field,
        }
    }

    pub fn context(&self) -> &Context<'a> {
        &self.context
    }
}

impl<T> Deref for Contextual<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> AsRef<T> for Contextual<'_, T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

impl<'a, 'v, T> Contextual<'a, &'v ReferenceOr<T>>
where
    T: DeserializeOwned + Clone,
{
    /// The returned value borrows from the wrapped `ReferenceOr`, not from
    /// this wrapper, so it stays usable after a temporary `Contextual` from
    /// an `append_deref` chain is gone.
    pub fn contextual_resolve(&self) -> anyhow::Result<(Cow<'v, T>, Context<'a>)> {
        self.value.resolve(&self.context)
    }
}

#[cfg(test)]
mod tests {
    use openapiv3::{ReferenceOr, Schema, SchemaKind, Type};
    use serde_json::json;

    use crate::context::{Context, Contextual, DiffContext, Position};

    #[test]
    fn test_irrelevance_is_directional() {
        let request = DiffContext::new(Position::Request);
        let response = DiffContext::new(Position::Response);

        // readOnly properties never appear in requests.
        assert!(request.is_irrelevant(true, false));
        assert!(!response.is_irrelevant(true, false));

        // writeOnly properties never appear in responses.
        assert!(response.is_irrelevant(false, true));
        assert!(!request.is_irrelevant(false, true));

        assert!(!request.is_irrelevant(false, false));
        assert!(!response.is_irrelevant(false, false));
    }

    // Resolution through a temporary wrapper built in the same statement:
    // the resolved value borrows from the ReferenceOr, not the wrapper, and
    // must stay usable after the statement ends.
    #[test]
    fn test_resolved_value_outlives_wrapper() {
        let doc = json!({
            "components": {
                "schemas": { "Pet": { "type": "object" } }
            }
        });
        let list = vec![
            ReferenceOr::<Schema>::Reference {
                reference: "#/components/schemas/Pet".to_string(),
            },
            ReferenceOr::Item(Schema {
                schema_data: Default::default(),
                schema_kind: SchemaKind::Type(Type::Object(Default::default())),
            }),
        ];
        let outer = Contextual::new(Context::new(&doc), &list);

        let (resolved, context) = outer.append_deref(&list[0], "0").contextual_resolve().unwrap();
        assert!(matches!(
            resolved.schema_kind,
            SchemaKind::Type(Type::Object(_))
        ));
        assert_eq!(context.path.to_string(), "#/components/schemas/Pet");

        // Same shape for the borrowed (inline item) case.
        let (resolved, _) = outer.append_deref(&list[1], "1").contextual_resolve().unwrap();
        assert!(matches!(
            resolved.schema_kind,
            SchemaKind::Type(Type::Object(_))
        ));
    }
}
