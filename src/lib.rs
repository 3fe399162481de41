// Copyright 2025 Oxide Computer Company

//! Skew detects changes between two OpenAPI documents and classifies each
//! one as backward compatible or incompatible from the point of view of an
//! existing client of the old document.
//!
//! The entry point is [`compare`] (or [`compare_with`] to tune options),
//! which takes both documents as raw JSON values and produces a
//! [`ChangedDocument`]: a tree mirroring the structure of the API, recording
//! what changed where. Call [`ChangedDocument::result`] to reduce the tree
//! to a single verdict, e.g. to gate a CI pipeline:
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let old = serde_json::from_str(&std::fs::read_to_string("v1.json")?)?;
//! let new = serde_json::from_str(&std::fs::read_to_string("v2.json")?)?;
//!
//! let diff = skew::compare(&old, &new)?;
//! if diff.result().is_incompatible() {
//!     anyhow::bail!("breaking API change");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Compatibility is directional: the same schema change can be fine for data
//! clients send (requests) and breaking for data they receive (responses),
//! or vice versa. A newly required property, for example, breaks requests
//! but not responses; a removed enum value breaks responses but not
//! requests. The [`Position`] in force at each point of the traversal
//! decides which rules apply.

mod change;
mod compare;
mod content;
mod context;
mod listdiff;
mod location;
mod mapdiff;
mod parameters;
mod resolve;
mod schema;

pub use change::{
    ChangedContent, ChangedDocument, ChangedEndpoint, ChangedHeader, ChangedHeaders,
    ChangedMediaType, ChangedOperation, ChangedParameter, ChangedParameters,
    ChangedRequestBody, ChangedResponse, ChangedResponses, DiffResult, Endpoint, FlagShift,
};
pub use compare::{compare, compare_with, CompareOptions};
pub use context::{Context, Contextual, DiffContext, Position};
pub use listdiff::ListDiff;
pub use location::JsonPath;
pub use mapdiff::MapDiff;
pub use resolve::ReferenceOrResolver;
pub use schema::{BoundChange, ChangedOneOf, ChangedSchema};
