// Copyright 2025 Oxide Computer Company

//! Parameter list comparison.
//!
//! Parameters are matched across documents by identity, that is the pair of
//! name and location (`query`, `header`, `path`, `cookie`), after any `$ref`
//! indirection has been resolved. Order within the list is immaterial.

use anyhow::Result;
use openapiv3::{Parameter, ParameterSchemaOrContent, ReferenceOr};

use crate::{
    change::{ChangedParameter, ChangedParameters, FlagShift},
    context::{Context, Contextual, DiffContext, Position},
    schema::SchemaDiffer,
};

/// A parameter resolved to a concrete value, still tied to the document
/// location it resolved at.
pub(crate) struct ResolvedParameter<'a> {
    pub parameter: Parameter,
    pub context: Context<'a>,
}

/// Resolve every entry of a parameter list in place, keeping each one's
/// resolved location for later schema traversal.
pub(crate) fn resolve_parameters<'a>(
    list: &Contextual<'a, &Vec<ReferenceOr<Parameter>>>,
) -> Result<Vec<ResolvedParameter<'a>>> {
    list.iter()
        .enumerate()
        .map(|(index, entry)| {
            let entry = list.append_deref(entry, &index.to_string());
            let (parameter, context) = entry.contextual_resolve()?;
            Ok(ResolvedParameter {
                parameter: parameter.into_owned(),
                context,
            })
        })
        .collect()
}

/// Combine path-level and operation-level parameter lists into the effective
/// list for one operation. An operation-level parameter overrides a
/// path-level one with the same identity.
pub(crate) fn merge_parameters<'a>(
    path_level: Vec<ResolvedParameter<'a>>,
    operation_level: Vec<ResolvedParameter<'a>>,
) -> Vec<ResolvedParameter<'a>> {
    let mut merged = operation_level;
    for entry in path_level {
        let overridden = merged
            .iter()
            .any(|existing| identity(&existing.parameter) == identity(&entry.parameter));
        if !overridden {
            merged.push(entry);
        }
    }
    merged
}

/// Compare two parameter lists. Unmatched left-hand parameters are removals,
/// unmatched right-hand parameters are additions, and identity matches are
/// diffed field by field. Returns `None` when nothing differs.
pub(crate) fn diff_parameters(
    differ: &mut SchemaDiffer,
    old: Vec<ResolvedParameter<'_>>,
    new: Vec<ResolvedParameter<'_>>,
) -> Result<Option<ChangedParameters>> {
    let mut remaining = new;
    let mut diff = ChangedParameters::default();

    for old_parameter in old {
        let old_identity = identity(&old_parameter.parameter);
        let matched = remaining
            .iter()
            .position(|candidate| identity(&candidate.parameter) == old_identity);
        match matched {
            Some(index) => {
                let new_parameter = remaining.remove(index);
                if let Some(changed) =
                    diff_parameter(differ, &old_parameter, &new_parameter)?
                {
                    diff.changed.push(changed);
                }
            }
            None => diff.removed.push(old_parameter.parameter),
        }
    }
    diff.added
        .extend(remaining.into_iter().map(|entry| entry.parameter));

    Ok(diff.is_changed().then_some(diff))
}

fn diff_parameter(
    differ: &mut SchemaDiffer,
    old: &ResolvedParameter<'_>,
    new: &ResolvedParameter<'_>,
) -> Result<Option<ChangedParameter>> {
    let (name, location) = identity(&new.parameter);
    let old_data = old.parameter.parameter_data_ref();
    let new_data = new.parameter.parameter_data_ref();

    let mut changed_format = false;
    let schema = match (&old_data.format, &new_data.format) {
        (
            ParameterSchemaOrContent::Schema(old_schema),
            ParameterSchemaOrContent::Schema(new_schema),
        ) => {
            // Parameters are always client-supplied, so schema changes are
            // judged in request position.
            let context =
                DiffContext::new(Position::Request).with_required(new_data.required);
            differ.diff_ref(
                Contextual::new(old.context.append("schema"), old_schema),
                Contextual::new(new.context.append("schema"), new_schema),
                context,
            )?
        }
        (old_format, new_format) if old_format == new_format => None,
        _ => {
            changed_format = true;
            None
        }
    };

    let changed = ChangedParameter {
        name: name.to_string(),
        location: location.to_string(),
        required: FlagShift::of(old_data.required, new_data.required),
        changed_description: old_data.description != new_data.description,
        changed_format,
        schema,
    };

    Ok(changed.is_changed().then_some(changed))
}

fn identity(parameter: &Parameter) -> (&str, &'static str) {
    let location = match parameter {
        Parameter::Query { .. } => "query",
        Parameter::Header { .. } => "header",
        Parameter::Path { .. } => "path",
        Parameter::Cookie { .. } => "cookie",
    };
    (&parameter.parameter_data_ref().name, location)
}

#[cfg(test)]
mod tests {
    use openapiv3::ReferenceOr;
    use serde_json::json;

    use crate::{
        change::FlagShift,
        context::{Context, Contextual},
        parameters::{diff_parameters, resolve_parameters},
        schema::SchemaDiffer,
    };

    fn parameter_list(
        document: &serde_json::Value,
        path: &str,
    ) -> Vec<ReferenceOr<openapiv3::Parameter>> {
        serde_json::from_value(document.pointer(path).unwrap().clone()).unwrap()
    }

    #[test]
    fn test_match_by_identity_not_order() {
        let doc = json!({
            "paths": {
                "/pets": {
                    "get": {
                        "parameters": [
                            { "name": "limit", "in": "query",
                              "schema": { "type": "integer" } },
                            { "name": "tag", "in": "query",
                              "schema": { "type": "string" } }
                        ]
                    }
                }
            }
        });
        let old_list = parameter_list(&doc, "/paths/~1pets/get/parameters");
        let new_list: Vec<_> = old_list.iter().rev().cloned().collect();
        let context = Context::new(&doc)
            .append("paths")
            .append("/pets")
            .append("get")
            .append("parameters");

        let mut differ = SchemaDiffer::new(16);
        let diff = diff_parameters(
            &mut differ,
            resolve_parameters(&Contextual::new(context.clone(), &old_list)).unwrap(),
            resolve_parameters(&Contextual::new(context, &new_list)).unwrap(),
        )
        .unwrap();
        assert!(diff.is_none());
    }

    #[test]
    fn test_same_name_different_location_is_two_parameters() {
        let doc = json!({
            "parameters": {
                "old": [
                    { "name": "token", "in": "query",
                      "schema": { "type": "string" } }
                ],
                "new": [
                    { "name": "token", "in": "header",
                      "schema": { "type": "string" } }
                ]
            }
        });
        let old_list = parameter_list(&doc, "/parameters/old");
        let new_list = parameter_list(&doc, "/parameters/new");
        let old_context = Context::new(&doc).append("parameters").append("old");
        let new_context = Context::new(&doc).append("parameters").append("new");

        let mut differ = SchemaDiffer::new(16);
        let diff = diff_parameters(
            &mut differ,
            resolve_parameters(&Contextual::new(old_context, &old_list)).unwrap(),
            resolve_parameters(&Contextual::new(new_context, &new_list)).unwrap(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_newly_required_parameter_field_diff() {
        let doc = json!({
            "parameters": {
                "old": [
                    { "name": "limit", "in": "query",
                      "schema": { "type": "integer" } }
                ],
                "new": [
                    { "name": "limit", "in": "query", "required": true,
                      "schema": { "type": "integer" } }
                ]
            }
        });
        let old_list = parameter_list(&doc, "/parameters/old");
        let new_list = parameter_list(&doc, "/parameters/new");
        let old_context = Context::new(&doc).append("parameters").append("old");
        let new_context = Context::new(&doc).append("parameters").append("new");

        let mut differ = SchemaDiffer::new(16);
        let diff = diff_parameters(
            &mut differ,
            resolve_parameters(&Contextual::new(old_context, &old_list)).unwrap(),
            resolve_parameters(&Contextual::new(new_context, &new_list)).unwrap(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(diff.changed.len(), 1);
        let changed = &diff.changed[0];
        assert_eq!(changed.name, "limit");
        assert_eq!(changed.location, "query");
        assert_eq!(changed.required, FlagShift::Enabled);
        assert!(changed.result().is_incompatible());
    }
}
