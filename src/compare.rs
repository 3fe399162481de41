// Copyright 2025 Oxide Computer Company

//! Document-level comparison: the crate's entry points.
//!
//! The walk is paths, then methods, then the parts of each shared operation:
//! parameters, request body, responses. Paths are matched by their literal
//! template string; `/pets/{id}` and `/pets/{petId}` are different paths.

use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use openapiv3::{OpenAPI, Operation, PathItem};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    change::{
        ChangedDocument, ChangedEndpoint, ChangedOperation, ChangedRequestBody, Endpoint,
        FlagShift,
    },
    content::{diff_content, diff_responses},
    context::{Context, Contextual, DiffContext, Position},
    mapdiff::MapDiff,
    parameters::{diff_parameters, merge_parameters, resolve_parameters},
    schema::SchemaDiffer,
};

/// Knobs for a comparison run.
#[derive(Clone, Debug)]
pub struct CompareOptions {
    /// Maximum schema recursion depth. Exceeding it fails the run rather
    /// than silently truncating the comparison.
    pub max_depth: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self { max_depth: 128 }
    }
}

/// Compare two raw OpenAPI documents with default options.
///
/// The inputs are raw [`Value`]s rather than parsed documents because `$ref`
/// resolution needs the original JSON to chase pointers through.
pub fn compare(old: &Value, new: &Value) -> Result<ChangedDocument> {
    compare_with(old, new, &CompareOptions::default())
}

pub fn compare_with(
    old: &Value,
    new: &Value,
    options: &CompareOptions,
) -> Result<ChangedDocument> {
    let old_document =
        OpenAPI::deserialize(old).context("error deserializing old OpenAPI document")?;
    let new_document =
        OpenAPI::deserialize(new).context("error deserializing new OpenAPI document")?;

    let old_paths = Contextual::new(
        Context::new(old).append("paths"),
        &old_document.paths.paths,
    );
    let new_paths = Contextual::new(
        Context::new(new).append("paths"),
        &new_document.paths.paths,
    );

    let path_diff = MapDiff::diff(Some(old_paths.iter()), Some(new_paths.iter()));
    log::debug!(
        "comparing documents: {} paths removed, {} added, {} shared",
        path_diff.removed.len(),
        path_diff.added.len(),
        path_diff.shared.len(),
    );

    let mut differ = SchemaDiffer::new(options.max_depth);
    let mut document = ChangedDocument::default();

    for (path, item) in &path_diff.added {
        let (item, _) = new_paths.append_deref(item, path).contextual_resolve()?;
        for (method, operation) in item.iter() {
            document.added_endpoints.push(Endpoint {
                path: path.clone(),
                method: method.to_string(),
                operation: operation.clone(),
            });
        }
    }
    for (path, item) in &path_diff.removed {
        let (item, _) = old_paths.append_deref(item, path).contextual_resolve()?;
        for (method, operation) in item.iter() {
            document.removed_endpoints.push(Endpoint {
                path: path.clone(),
                method: method.to_string(),
                operation: operation.clone(),
            });
        }
    }

    for path in &path_diff.shared {
        let (Some(old_item), Some(new_item)) = (old_paths.get(path), new_paths.get(path))
        else {
            continue;
        };
        let (old_item, old_context) =
            old_paths.append_deref(old_item, path).contextual_resolve()?;
        let (new_item, new_context) =
            new_paths.append_deref(new_item, path).contextual_resolve()?;

        let endpoint = diff_path_item(
            &mut differ,
            path,
            &Contextual::new(old_context, &*old_item),
            &Contextual::new(new_context, &*new_item),
        )?;
        if let Some(endpoint) = endpoint {
            // Per-method additions and removals on a shared path also appear
            // in the flat document-level endpoint records.
            for (method, operation) in &endpoint.added_operations {
                document.added_endpoints.push(Endpoint {
                    path: path.clone(),
                    method: method.clone(),
                    operation: operation.clone(),
                });
            }
            for (method, operation) in &endpoint.removed_operations {
                document.removed_endpoints.push(Endpoint {
                    path: path.clone(),
                    method: method.clone(),
                    operation: operation.clone(),
                });
            }
            document.changed_endpoints.push(endpoint);
        }
    }

    log::debug!(
        "comparison complete: {} endpoints added, {} removed, {} changed ({:?})",
        document.added_endpoints.len(),
        document.removed_endpoints.len(),
        document.changed_endpoints.len(),
        document.result(),
    );
    Ok(document)
}

fn diff_path_item(
    differ: &mut SchemaDiffer,
    path: &str,
    old: &Contextual<'_, &PathItem>,
    new: &Contextual<'_, &PathItem>,
) -> Result<Option<ChangedEndpoint>> {
    let old_methods: IndexMap<String, Operation> = old
        .iter()
        .map(|(method, operation)| (method.to_string(), operation.clone()))
        .collect();
    let new_methods: IndexMap<String, Operation> = new
        .iter()
        .map(|(method, operation)| (method.to_string(), operation.clone()))
        .collect();
    let method_diff = MapDiff::diff(Some(old_methods.iter()), Some(new_methods.iter()));

    let mut endpoint = ChangedEndpoint {
        path: path.to_string(),
        added_operations: method_diff.added,
        removed_operations: method_diff.removed,
        changed_operations: IndexMap::new(),
    };

    for method in &method_diff.shared {
        let (Some(old_operation), Some(new_operation)) =
            (old_methods.get(method), new_methods.get(method))
        else {
            continue;
        };
        log::debug!("comparing operation {} {path}", method.to_uppercase());

        let changed = diff_operation(
            differ,
            path,
            method,
            &old.append_deref(old_operation, method),
            &new.append_deref(new_operation, method),
            old,
            new,
        )?;
        if let Some(changed) = changed {
            endpoint.changed_operations.insert(method.clone(), changed);
        }
    }

    Ok(endpoint.is_changed().then_some(endpoint))
}

fn diff_operation(
    differ: &mut SchemaDiffer,
    path: &str,
    method: &str,
    old: &Contextual<'_, &Operation>,
    new: &Contextual<'_, &Operation>,
    old_item: &Contextual<'_, &PathItem>,
    new_item: &Contextual<'_, &PathItem>,
) -> Result<Option<ChangedOperation>> {
    let old_parameters = merge_parameters(
        resolve_parameters(&old_item.append_deref(&old_item.parameters, "parameters"))?,
        resolve_parameters(&old.append_deref(&old.parameters, "parameters"))?,
    );
    let new_parameters = merge_parameters(
        resolve_parameters(&new_item.append_deref(&new_item.parameters, "parameters"))?,
        resolve_parameters(&new.append_deref(&new.parameters, "parameters"))?,
    );
    let parameters = diff_parameters(differ, old_parameters, new_parameters)?;

    let request_body = match (&old.request_body, &new.request_body) {
        (None, None) => None,
        (None, Some(body)) => {
            let (body, _) = new
                .append_deref(body, "requestBody")
                .contextual_resolve()?;
            Some(ChangedRequestBody::Added {
                required: body.required,
            })
        }
        (Some(body), None) => {
            let (body, _) = old
                .append_deref(body, "requestBody")
                .contextual_resolve()?;
            Some(ChangedRequestBody::Removed {
                required: body.required,
            })
        }
        (Some(old_body), Some(new_body)) => {
            let (old_body, old_body_context) = old
                .append_deref(old_body, "requestBody")
                .contextual_resolve()?;
            let (new_body, new_body_context) = new
                .append_deref(new_body, "requestBody")
                .contextual_resolve()?;

            let required = FlagShift::of(old_body.required, new_body.required);
            let changed_description = old_body.description != new_body.description;
            let content = diff_content(
                differ,
                &Contextual::new(old_body_context.append("content"), &old_body.content),
                &Contextual::new(new_body_context.append("content"), &new_body.content),
                DiffContext::new(Position::Request).with_required(new_body.required),
            )?;

            if required.is_unchanged() && !changed_description && content.is_none() {
                None
            } else {
                Some(ChangedRequestBody::Changed {
                    required,
                    changed_description,
                    content,
                })
            }
        }
    };

    let responses = diff_responses(
        differ,
        &old.append_deref(&old.responses, "responses"),
        &new.append_deref(&new.responses, "responses"),
    )?;

    let changed = ChangedOperation {
        path: path.to_string(),
        method: method.to_string(),
        deprecated: FlagShift::of(old.deprecated, new.deprecated),
        parameters,
        request_body,
        responses,
    };

    Ok(changed.is_changed().then_some(changed))
}
