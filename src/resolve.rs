// Copyright 2025 Oxide Computer Company

use std::borrow::Cow;

use anyhow::anyhow;
use openapiv3::ReferenceOr;
use serde::{de::DeserializeOwned, Deserialize};

use crate::context::Context;

/// Read-only `$ref` resolution against the raw document carried by a
/// [`Context`].
///
/// Resolution follows chains of references until a concrete item is found.
/// An unresolvable pointer is a hard error naming the reference and the
/// location it was encountered at; it is never treated as a legitimate
/// absence.
pub trait ReferenceOrResolver<'a, 'context, T>
where
    T: Clone,
{
    fn resolve(
        &'a self,
        context: &Context<'context>,
    ) -> anyhow::Result<(Cow<'a, T>, Context<'context>)>;
}

impl<'a, 'context, T> ReferenceOrResolver<'a, 'context, T> for ReferenceOr<T>
where
    T: DeserializeOwned + Clone,
{
    fn resolve(
        &'a self,
        context: &Context<'context>,
    ) -> anyhow::Result<(Cow<'a, T>, Context<'context>)> {
        let mut context = context.clone();
        let mut target = match self {
            ReferenceOr::Item(item) => return Ok((Cow::Borrowed(item), context)),
            ReferenceOr::Reference { reference } => Cow::Borrowed(reference),
        };

        loop {
            if !target.starts_with("#/") {
                return Err(anyhow!(
                    "unsupported reference {target} at {}: \
                     only fragment pointers (#/...) are resolvable",
                    context.path,
                ));
            }
            context = context.jump(target.as_ref());

            let subtree = context
                .raw_document
                .pointer(context.path.pointer())
                .ok_or_else(|| anyhow!("unresolvable reference {target} at {}", context.path))?;

            let item_or_reference = ReferenceOr::<T>::deserialize(subtree)?;

            match item_or_reference {
                ReferenceOr::Item(item) => return Ok((Cow::Owned(item), context)),

                ReferenceOr::Reference { reference } => {
                    target = Cow::Owned(reference);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use openapiv3::{ReferenceOr, Schema};
    use serde_json::json;

    use crate::{context::Context, resolve::ReferenceOrResolver};

    #[test]
    fn test_resolve_chain() {
        let doc = json!({
            "components": {
                "schemas": {
                    "Alias": { "$ref": "#/components/schemas/Pet" },
                    "Pet": { "type": "object" }
                }
            }
        });
        let context = Context::new(&doc);

        let reference = ReferenceOr::<Schema>::Reference {
            reference: "#/components/schemas/Alias".to_string(),
        };
        let (schema, resolved_context) = reference.resolve(&context).unwrap();
        assert!(matches!(
            schema.schema_kind,
            openapiv3::SchemaKind::Type(openapiv3::Type::Object(_))
        ));
        assert_eq!(
            resolved_context.path.to_string(),
            "#/components/schemas/Pet"
        );
    }

    #[test]
    fn test_unresolvable_is_an_error() {
        let doc = json!({});
        let context = Context::new(&doc);

        let reference = ReferenceOr::<Schema>::Reference {
            reference: "#/components/schemas/Missing".to_string(),
        };
        let err = reference.resolve(&context).unwrap_err();
        assert!(err.to_string().contains("unresolvable reference"));
    }
}
