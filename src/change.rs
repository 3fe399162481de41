// Copyright 2025 Oxide Computer Company

//! The result tree produced by a comparison run.
//!
//! Every node is built complete from its inputs and never mutated afterward.
//! Verdicts flow strictly upward: each node's [`result`](ChangedDocument::result)
//! merges its own classification with those of its children, so a parent is
//! incompatible exactly when any part of its subtree is.

use indexmap::IndexMap;
use openapiv3::{Header, MediaType, Operation, Parameter, Response, Schema};

use crate::{context::Position, schema::ChangedSchema};

/// Tri-state compatibility verdict.
///
/// Ordered by severity so that composition is a plain maximum: a parent is
/// `Incompatible` if any child is, else `Compatible` if any child is, else
/// `NoChange`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiffResult {
    NoChange,
    Compatible,
    Incompatible,
}

impl DiffResult {
    pub fn merge(self, other: DiffResult) -> DiffResult {
        self.max(other)
    }

    pub fn merge_all(results: impl IntoIterator<Item = DiffResult>) -> DiffResult {
        results
            .into_iter()
            .fold(DiffResult::NoChange, DiffResult::merge)
    }

    pub fn is_incompatible(&self) -> bool {
        matches!(self, DiffResult::Incompatible)
    }
}

/// Transition of a boolean marker (required, deprecated, readOnly, ...)
/// between the two documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlagShift {
    #[default]
    Unchanged,
    /// Absent or false before, true after.
    Enabled,
    /// True before, absent or false after.
    Disabled,
}

impl FlagShift {
    pub fn of(old: bool, new: bool) -> Self {
        match (old, new) {
            (false, true) => FlagShift::Enabled,
            (true, false) => FlagShift::Disabled,
            _ => FlagShift::Unchanged,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, FlagShift::Unchanged)
    }
}

/// One operation, identified by path and HTTP method. Used for the flat
/// added/removed endpoint records.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    pub operation: Operation,
}

/// Top-level comparison result: the sole contract with renderers and CI
/// gates. A gate maps [`DiffResult::Incompatible`] to a non-zero exit status.
#[derive(Debug, Default)]
pub struct ChangedDocument {
    /// Operations present only in the new document, one per path × method.
    pub added_endpoints: Vec<Endpoint>,
    /// Operations present only in the old document, one per path × method.
    pub removed_endpoints: Vec<Endpoint>,
    pub changed_endpoints: Vec<ChangedEndpoint>,
}

impl ChangedDocument {
    pub fn is_changed(&self) -> bool {
        !self.added_endpoints.is_empty()
            || !self.removed_endpoints.is_empty()
            || !self.changed_endpoints.is_empty()
    }

    /// Operations whose `deprecated` flag newly became true.
    pub fn newly_deprecated(&self) -> impl Iterator<Item = &ChangedOperation> {
        self.changed_endpoints
            .iter()
            .flat_map(|endpoint| endpoint.changed_operations.values())
            .filter(|operation| operation.deprecated == FlagShift::Enabled)
    }

    pub fn result(&self) -> DiffResult {
        let removed = if self.removed_endpoints.is_empty() {
            DiffResult::NoChange
        } else {
            // A removed operation breaks every existing caller.
            DiffResult::Incompatible
        };
        let added = if self.added_endpoints.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Compatible
        };

        removed.merge(added).merge(DiffResult::merge_all(
            self.changed_endpoints.iter().map(ChangedEndpoint::result),
        ))
    }
}

/// Change record for one path shared by both documents.
#[derive(Debug)]
pub struct ChangedEndpoint {
    pub path: String,
    /// Methods on this path present only in the new document.
    pub added_operations: IndexMap<String, Operation>,
    /// Methods on this path present only in the old document.
    pub removed_operations: IndexMap<String, Operation>,
    pub changed_operations: IndexMap<String, ChangedOperation>,
}

impl ChangedEndpoint {
    pub fn is_changed(&self) -> bool {
        !self.added_operations.is_empty()
            || !self.removed_operations.is_empty()
            || !self.changed_operations.is_empty()
    }

    pub fn result(&self) -> DiffResult {
        let removed = if self.removed_operations.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Incompatible
        };
        let added = if self.added_operations.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Compatible
        };

        removed.merge(added).merge(DiffResult::merge_all(
            self.changed_operations.values().map(ChangedOperation::result),
        ))
    }
}

/// Change record for one HTTP method shared on a shared path.
#[derive(Debug)]
pub struct ChangedOperation {
    pub path: String,
    pub method: String,
    /// Deprecation transition; [`FlagShift::Enabled`] means the operation is
    /// newly deprecated.
    pub deprecated: FlagShift,
    pub parameters: Option<ChangedParameters>,
    pub request_body: Option<ChangedRequestBody>,
    pub responses: Option<ChangedResponses>,
}

impl ChangedOperation {
    pub fn is_changed(&self) -> bool {
        self.parameters.is_some()
            || self.request_body.is_some()
            || self.responses.is_some()
            || !self.deprecated.is_unchanged()
    }

    pub fn result(&self) -> DiffResult {
        let mut result = DiffResult::NoChange;
        if !self.deprecated.is_unchanged() {
            result = result.merge(DiffResult::Compatible);
        }
        if let Some(parameters) = &self.parameters {
            result = result.merge(parameters.result());
        }
        if let Some(body) = &self.request_body {
            result = result.merge(body.result());
        }
        if let Some(responses) = &self.responses {
            result = result.merge(responses.result());
        }
        result
    }
}

/// Presence and field changes of an operation's request body.
#[derive(Debug)]
pub enum ChangedRequestBody {
    /// No body was specified and now one is. A required body breaks old
    /// clients, which do not send one.
    Added { required: bool },
    /// A body was specified and no longer is. Old clients keep sending it;
    /// that is a problem for the new server, not for them.
    Removed { required: bool },
    Changed {
        required: FlagShift,
        changed_description: bool,
        content: Option<ChangedContent>,
    },
}

impl ChangedRequestBody {
    pub fn result(&self) -> DiffResult {
        match self {
            ChangedRequestBody::Added { required: true } => DiffResult::Incompatible,
            ChangedRequestBody::Added { required: false } => DiffResult::Compatible,
            ChangedRequestBody::Removed { .. } => DiffResult::Compatible,
            ChangedRequestBody::Changed {
                required,
                changed_description,
                content,
            } => {
                let mut result = DiffResult::NoChange;
                match required {
                    FlagShift::Enabled => result = result.merge(DiffResult::Incompatible),
                    FlagShift::Disabled => result = result.merge(DiffResult::Compatible),
                    FlagShift::Unchanged => {}
                }
                if *changed_description {
                    result = result.merge(DiffResult::Compatible);
                }
                if let Some(content) = content {
                    result = result.merge(content.result());
                }
                result
            }
        }
    }
}

/// Diff of two parameter lists, matched by (name, location) identity.
#[derive(Debug, Default)]
pub struct ChangedParameters {
    pub added: Vec<Parameter>,
    pub removed: Vec<Parameter>,
    pub changed: Vec<ChangedParameter>,
}

impl ChangedParameters {
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    pub fn result(&self) -> DiffResult {
        // A removed parameter may silently change the semantics of requests
        // that still send it.
        let removed = if self.removed.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Incompatible
        };

        // A new required parameter breaks old clients; a new optional one
        // does not.
        let added = DiffResult::merge_all(self.added.iter().map(|parameter| {
            if parameter.parameter_data_ref().required {
                DiffResult::Incompatible
            } else {
                DiffResult::Compatible
            }
        }));

        removed.merge(added).merge(DiffResult::merge_all(
            self.changed.iter().map(ChangedParameter::result),
        ))
    }
}

/// Field-level diff of one parameter present in both documents.
#[derive(Debug)]
pub struct ChangedParameter {
    pub name: String,
    /// Location of the parameter: `query`, `header`, `path`, or `cookie`.
    pub location: String,
    pub required: FlagShift,
    pub changed_description: bool,
    /// The parameter switched between schema and content form, or its
    /// content form changed; not comparable field-by-field.
    pub changed_format: bool,
    pub schema: Option<ChangedSchema>,
}

impl ChangedParameter {
    pub fn is_changed(&self) -> bool {
        !self.required.is_unchanged()
            || self.changed_description
            || self.changed_format
            || self.schema.is_some()
    }

    pub fn result(&self) -> DiffResult {
        let required = match self.required {
            // Parameters are inputs: requiring more is breaking, requiring
            // less is not.
            FlagShift::Enabled => DiffResult::Incompatible,
            FlagShift::Disabled => DiffResult::Compatible,
            FlagShift::Unchanged => DiffResult::NoChange,
        };
        let description = if self.changed_description {
            DiffResult::Compatible
        } else {
            DiffResult::NoChange
        };
        let format = if self.changed_format {
            DiffResult::Incompatible
        } else {
            DiffResult::NoChange
        };
        let schema = self
            .schema
            .as_ref()
            .map_or(DiffResult::NoChange, ChangedSchema::result);

        required.merge(description).merge(format).merge(schema)
    }
}

/// Diff of an operation's response map, keyed by status code (the `default`
/// response participates under the key `"default"`).
#[derive(Debug, Default)]
pub struct ChangedResponses {
    pub added: IndexMap<String, Response>,
    pub removed: IndexMap<String, Response>,
    pub changed: IndexMap<String, ChangedResponse>,
}

impl ChangedResponses {
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    pub fn result(&self) -> DiffResult {
        // A new status code is something old clients don't expect; a removed
        // one is simply no longer sent.
        let added = if self.added.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Incompatible
        };
        let removed = if self.removed.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Compatible
        };

        added.merge(removed).merge(DiffResult::merge_all(
            self.changed.values().map(ChangedResponse::result),
        ))
    }
}

/// Diff of one response shared by both documents.
#[derive(Debug)]
pub struct ChangedResponse {
    pub changed_description: bool,
    pub content: Option<ChangedContent>,
    pub headers: Option<ChangedHeaders>,
}

impl ChangedResponse {
    pub fn is_changed(&self) -> bool {
        self.changed_description || self.content.is_some() || self.headers.is_some()
    }

    pub fn result(&self) -> DiffResult {
        let description = if self.changed_description {
            DiffResult::Compatible
        } else {
            DiffResult::NoChange
        };
        let content = self
            .content
            .as_ref()
            .map_or(DiffResult::NoChange, ChangedContent::result);
        let headers = self
            .headers
            .as_ref()
            .map_or(DiffResult::NoChange, ChangedHeaders::result);

        description.merge(content).merge(headers)
    }
}

/// Diff of a response's header map. Headers are always evaluated in response
/// position.
#[derive(Debug, Default)]
pub struct ChangedHeaders {
    pub added: IndexMap<String, Header>,
    pub removed: IndexMap<String, Header>,
    pub changed: IndexMap<String, ChangedHeader>,
}

impl ChangedHeaders {
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    pub fn result(&self) -> DiffResult {
        // Old clients may depend on a header that the new server no longer
        // documents.
        let removed = if self.removed.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Incompatible
        };
        let added = if self.added.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Compatible
        };

        removed.merge(added).merge(DiffResult::merge_all(
            self.changed.values().map(ChangedHeader::result),
        ))
    }
}

/// Field-level diff of one response header.
#[derive(Debug)]
pub struct ChangedHeader {
    pub name: String,
    pub required: FlagShift,
    pub changed_description: bool,
    /// See [`ChangedParameter::changed_format`].
    pub changed_format: bool,
    pub schema: Option<ChangedSchema>,
}

impl ChangedHeader {
    pub fn is_changed(&self) -> bool {
        !self.required.is_unchanged()
            || self.changed_description
            || self.changed_format
            || self.schema.is_some()
    }

    pub fn result(&self) -> DiffResult {
        let required = match self.required {
            // Headers are outputs: a guaranteed header becoming optional
            // breaks clients that relied on it.
            FlagShift::Disabled => DiffResult::Incompatible,
            FlagShift::Enabled => DiffResult::Compatible,
            FlagShift::Unchanged => DiffResult::NoChange,
        };
        let description = if self.changed_description {
            DiffResult::Compatible
        } else {
            DiffResult::NoChange
        };
        let format = if self.changed_format {
            DiffResult::Incompatible
        } else {
            DiffResult::NoChange
        };
        let schema = self
            .schema
            .as_ref()
            .map_or(DiffResult::NoChange, ChangedSchema::result);

        required.merge(description).merge(format).merge(schema)
    }
}

/// Diff of a media-type map (content-type → body description).
#[derive(Debug)]
pub struct ChangedContent {
    pub position: Position,
    pub added: IndexMap<String, MediaType>,
    pub removed: IndexMap<String, MediaType>,
    pub changed: IndexMap<String, ChangedMediaType>,
}

impl ChangedContent {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            added: IndexMap::new(),
            removed: IndexMap::new(),
            changed: IndexMap::new(),
        }
    }

    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    pub fn result(&self) -> DiffResult {
        // Dropping a media type strands existing senders or consumers of that
        // representation in either direction.
        let removed = if self.removed.is_empty() {
            DiffResult::NoChange
        } else {
            DiffResult::Incompatible
        };
        let added = if self.added.is_empty() {
            DiffResult::NoChange
        } else {
            match self.position {
                // The new server accepts representations it previously
                // rejected.
                Position::Request => DiffResult::Compatible,
                // The new server may emit representations old clients never
                // negotiated for.
                Position::Response => DiffResult::Incompatible,
            }
        };

        removed.merge(added).merge(DiffResult::merge_all(
            self.changed
                .values()
                .map(|media_type| media_type.result(self.position)),
        ))
    }
}

/// Diff of one shared media type's schema.
#[derive(Debug)]
pub enum ChangedMediaType {
    /// No schema was specified for this media type and now one is.
    SchemaAppeared(Schema),
    /// A schema was specified and no longer is.
    SchemaDisappeared(Schema),
    SchemaChanged(ChangedSchema),
}

impl ChangedMediaType {
    pub fn result(&self, position: Position) -> DiffResult {
        match self {
            // Requests: a constraint now exists where none did, so old
            // clients may send data the new server rejects. Responses: old
            // clients accepted anything, so a concrete shape is fine.
            ChangedMediaType::SchemaAppeared(_) => match position {
                Position::Request => DiffResult::Incompatible,
                Position::Response => DiffResult::Compatible,
            },
            // The inverse of the above.
            ChangedMediaType::SchemaDisappeared(_) => match position {
                Position::Request => DiffResult::Compatible,
                Position::Response => DiffResult::Incompatible,
            },
            ChangedMediaType::SchemaChanged(schema) => schema.result(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::change::{DiffResult, FlagShift};

    #[test]
    fn test_result_merge_is_severity_max() {
        use DiffResult::*;

        assert_eq!(NoChange.merge(NoChange), NoChange);
        assert_eq!(NoChange.merge(Compatible), Compatible);
        assert_eq!(Compatible.merge(NoChange), Compatible);
        assert_eq!(Compatible.merge(Incompatible), Incompatible);
        assert_eq!(Incompatible.merge(Compatible), Incompatible);

        assert_eq!(DiffResult::merge_all([]), NoChange);
        assert_eq!(
            DiffResult::merge_all([Compatible, NoChange, Incompatible]),
            Incompatible
        );
    }

    #[test]
    fn test_flag_shift() {
        assert_eq!(FlagShift::of(false, true), FlagShift::Enabled);
        assert_eq!(FlagShift::of(true, false), FlagShift::Disabled);
        assert_eq!(FlagShift::of(true, true), FlagShift::Unchanged);
        assert_eq!(FlagShift::of(false, false), FlagShift::Unchanged);
    }
}
