// Copyright 2025 Oxide Computer Company

//! Comparison of media-type maps, response maps, and response headers.
//!
//! These all follow the same shape: partition the map by key, resolve what
//! only one side has so the result tree is self-contained, and recurse into
//! what both sides share.

use anyhow::Result;
use indexmap::IndexMap;
use openapiv3::{
    Header, MediaType, ParameterSchemaOrContent, ReferenceOr, Response, Responses,
};

use crate::{
    change::{
        ChangedContent, ChangedHeader, ChangedHeaders, ChangedMediaType, ChangedResponse,
        ChangedResponses, FlagShift,
    },
    context::{Contextual, DiffContext, Position},
    mapdiff::MapDiff,
    schema::SchemaDiffer,
};

/// Compare two `content` maps (media type → body description). The schema of
/// each shared media type is diffed in the position carried by `context`.
pub(crate) fn diff_content(
    differ: &mut SchemaDiffer,
    old: &Contextual<'_, &IndexMap<String, MediaType>>,
    new: &Contextual<'_, &IndexMap<String, MediaType>>,
    context: DiffContext,
) -> Result<Option<ChangedContent>> {
    let map_diff = MapDiff::diff(Some(old.iter()), Some(new.iter()));

    let mut diff = ChangedContent::new(context.position);
    diff.added = map_diff.added;
    diff.removed = map_diff.removed;

    for media_type in &map_diff.shared {
        let (Some(old_value), Some(new_value)) = (old.get(media_type), new.get(media_type))
        else {
            continue;
        };
        let old_media = old.append_deref(old_value, media_type);
        let new_media = new.append_deref(new_value, media_type);

        let changed = match (&old_media.schema, &new_media.schema) {
            (None, None) => None,
            (None, Some(new_schema)) => {
                let (schema, _) = new_media
                    .append_deref(new_schema, "schema")
                    .contextual_resolve()?;
                Some(ChangedMediaType::SchemaAppeared(schema.into_owned()))
            }
            (Some(old_schema), None) => {
                let (schema, _) = old_media
                    .append_deref(old_schema, "schema")
                    .contextual_resolve()?;
                Some(ChangedMediaType::SchemaDisappeared(schema.into_owned()))
            }
            (Some(old_schema), Some(new_schema)) => differ
                .diff_ref(
                    old_media.append_deref(old_schema, "schema"),
                    new_media.append_deref(new_schema, "schema"),
                    context,
                )?
                .map(ChangedMediaType::SchemaChanged),
        };

        if let Some(changed) = changed {
            diff.changed.insert(media_type.clone(), changed);
        }
    }

    Ok(diff.is_changed().then_some(diff))
}

/// Compare two response maps. The `default` response participates under the
/// literal key `default`, next to the status codes.
pub(crate) fn diff_responses(
    differ: &mut SchemaDiffer,
    old: &Contextual<'_, &Responses>,
    new: &Contextual<'_, &Responses>,
) -> Result<Option<ChangedResponses>> {
    let old_map = keyed_responses(old);
    let new_map = keyed_responses(new);
    let map_diff = MapDiff::diff(Some(old_map.iter()), Some(new_map.iter()));

    let mut diff = ChangedResponses::default();
    for (status, response) in &map_diff.added {
        let (response, _) = new
            .append_deref(response, status)
            .contextual_resolve()?;
        diff.added.insert(status.clone(), response.into_owned());
    }
    for (status, response) in &map_diff.removed {
        let (response, _) = old
            .append_deref(response, status)
            .contextual_resolve()?;
        diff.removed.insert(status.clone(), response.into_owned());
    }

    for status in &map_diff.shared {
        let (old_response, old_context) = old
            .append_deref(&old_map[status], status)
            .contextual_resolve()?;
        let (new_response, new_context) = new
            .append_deref(&new_map[status], status)
            .contextual_resolve()?;

        let changed = diff_response(
            differ,
            &Contextual::new(old_context, &*old_response),
            &Contextual::new(new_context, &*new_response),
        )?;
        if let Some(changed) = changed {
            diff.changed.insert(status.clone(), changed);
        }
    }

    Ok(diff.is_changed().then_some(diff))
}

fn keyed_responses(
    responses: &Contextual<'_, &Responses>,
) -> IndexMap<String, ReferenceOr<Response>> {
    let mut map = IndexMap::new();
    if let Some(default) = &responses.default {
        map.insert("default".to_string(), default.clone());
    }
    for (status, response) in &responses.responses {
        map.insert(status.to_string(), response.clone());
    }
    map
}

fn diff_response(
    differ: &mut SchemaDiffer,
    old: &Contextual<'_, &Response>,
    new: &Contextual<'_, &Response>,
) -> Result<Option<ChangedResponse>> {
    let changed = ChangedResponse {
        changed_description: old.description != new.description,
        content: diff_content(
            differ,
            &old.append_deref(&old.content, "content"),
            &new.append_deref(&new.content, "content"),
            DiffContext::new(Position::Response),
        )?,
        headers: diff_headers(
            differ,
            &old.append_deref(&old.headers, "headers"),
            &new.append_deref(&new.headers, "headers"),
        )?,
    };

    Ok(changed.is_changed().then_some(changed))
}

/// Compare two response-header maps. Headers only ever travel server to
/// client, so their schemas are always diffed in response position.
pub(crate) fn diff_headers(
    differ: &mut SchemaDiffer,
    old: &Contextual<'_, &IndexMap<String, ReferenceOr<Header>>>,
    new: &Contextual<'_, &IndexMap<String, ReferenceOr<Header>>>,
) -> Result<Option<ChangedHeaders>> {
    let map_diff = MapDiff::diff(Some(old.iter()), Some(new.iter()));

    let mut diff = ChangedHeaders::default();
    for (name, header) in &map_diff.added {
        let (header, _) = new.append_deref(header, name).contextual_resolve()?;
        diff.added.insert(name.clone(), header.into_owned());
    }
    for (name, header) in &map_diff.removed {
        let (header, _) = old.append_deref(header, name).contextual_resolve()?;
        diff.removed.insert(name.clone(), header.into_owned());
    }

    for name in &map_diff.shared {
        let (Some(old_value), Some(new_value)) = (old.get(name), new.get(name)) else {
            continue;
        };
        let (old_header, old_context) =
            old.append_deref(old_value, name).contextual_resolve()?;
        let (new_header, new_context) =
            new.append_deref(new_value, name).contextual_resolve()?;

        let changed = diff_header(
            differ,
            name,
            &Contextual::new(old_context, &*old_header),
            &Contextual::new(new_context, &*new_header),
        )?;
        if let Some(changed) = changed {
            diff.changed.insert(name.clone(), changed);
        }
    }

    Ok(diff.is_changed().then_some(diff))
}

fn diff_header(
    differ: &mut SchemaDiffer,
    name: &str,
    old: &Contextual<'_, &Header>,
    new: &Contextual<'_, &Header>,
) -> Result<Option<ChangedHeader>> {
    let mut changed_format = false;
    let schema = match (&old.format, &new.format) {
        (
            ParameterSchemaOrContent::Schema(old_schema),
            ParameterSchemaOrContent::Schema(new_schema),
        ) => differ.diff_ref(
            old.append_deref(old_schema, "schema"),
            new.append_deref(new_schema, "schema"),
            DiffContext::new(Position::Response).with_required(new.required),
        )?,
        (old_format, new_format) if old_format == new_format => None,
        _ => {
            changed_format = true;
            None
        }
    };

    let changed = ChangedHeader {
        name: name.to_string(),
        required: FlagShift::of(old.required, new.required),
        changed_description: old.description != new.description,
        changed_format,
        schema,
    };

    Ok(changed.is_changed().then_some(changed))
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use openapiv3::MediaType;
    use serde_json::json;

    use crate::{
        change::ChangedMediaType,
        content::{diff_content, diff_responses},
        context::{Context, Contextual, DiffContext, Position},
        schema::SchemaDiffer,
    };

    fn content_map(
        document: &serde_json::Value,
        path: &str,
    ) -> IndexMap<String, MediaType> {
        serde_json::from_value(document.pointer(path).unwrap().clone()).unwrap()
    }

    #[test]
    fn test_media_type_schema_appears() {
        let doc = json!({
            "content": {
                "old": { "application/json": {} },
                "new": {
                    "application/json": { "schema": { "type": "string" } }
                }
            }
        });
        let old_map = content_map(&doc, "/content/old");
        let new_map = content_map(&doc, "/content/new");
        let old = Contextual::new(Context::new(&doc).append("content").append("old"), &old_map);
        let new = Contextual::new(Context::new(&doc).append("content").append("new"), &new_map);

        let mut differ = SchemaDiffer::new(16);
        let diff = diff_content(
            &mut differ,
            &old,
            &new,
            DiffContext::new(Position::Request),
        )
        .unwrap()
        .unwrap();

        let changed = &diff.changed["application/json"];
        assert!(matches!(changed, ChangedMediaType::SchemaAppeared(_)));
        // A request body that previously accepted anything now has a shape.
        assert!(diff.result().is_incompatible());
    }

    #[test]
    fn test_default_response_participates() {
        let doc = json!({
            "responses": {
                "old": {
                    "200": { "description": "ok" }
                },
                "new": {
                    "200": { "description": "ok" },
                    "default": { "description": "error" }
                }
            }
        });
        let old_map: openapiv3::Responses =
            serde_json::from_value(doc.pointer("/responses/old").unwrap().clone()).unwrap();
        let new_map: openapiv3::Responses =
            serde_json::from_value(doc.pointer("/responses/new").unwrap().clone()).unwrap();
        let old = Contextual::new(
            Context::new(&doc).append("responses").append("old"),
            &old_map,
        );
        let new = Contextual::new(
            Context::new(&doc).append("responses").append("new"),
            &new_map,
        );

        let mut differ = SchemaDiffer::new(16);
        let diff = diff_responses(&mut differ, &old, &new).unwrap().unwrap();

        assert!(diff.added.contains_key("default"));
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
        // Old clients never saw these statuses.
        assert!(diff.result().is_incompatible());
    }

    #[test]
    fn test_response_header_no_longer_guaranteed() {
        let doc = json!({
            "responses": {
                "old": {
                    "200": {
                        "description": "ok",
                        "headers": {
                            "x-request-id": {
                                "required": true,
                                "schema": { "type": "string" }
                            }
                        }
                    }
                },
                "new": {
                    "200": {
                        "description": "ok",
                        "headers": {
                            "x-request-id": {
                                "schema": { "type": "string" }
                            }
                        }
                    }
                }
            }
        });
        let old_map: openapiv3::Responses =
            serde_json::from_value(doc.pointer("/responses/old").unwrap().clone()).unwrap();
        let new_map: openapiv3::Responses =
            serde_json::from_value(doc.pointer("/responses/new").unwrap().clone()).unwrap();
        let old = Contextual::new(
            Context::new(&doc).append("responses").append("old"),
            &old_map,
        );
        let new = Contextual::new(
            Context::new(&doc).append("responses").append("new"),
            &new_map,
        );

        let mut differ = SchemaDiffer::new(16);
        let diff = diff_responses(&mut differ, &old, &new).unwrap().unwrap();

        let changed = &diff.changed["200"];
        let headers = changed.headers.as_ref().unwrap();
        assert!(headers.changed["x-request-id"].result().is_incompatible());
    }
}
