// Copyright 2025 Oxide Computer Company

//! Recursive schema comparison and compatibility classification.
//!
//! Compatibility is direction-asymmetric: the rules for a schema describing
//! request data differ from those for response data, which is why a
//! [`DiffContext`] is threaded through every recursive call. Reference cycles
//! are broken by a path-scoped visited set keyed on the pair of `$ref`
//! targets; a pair already on the current path reports no further difference.

use std::collections::BTreeSet;

use anyhow::bail;
use indexmap::IndexMap;
use openapiv3::{
    AdditionalProperties, ArrayType, Discriminator, IntegerType, NumberType, ObjectType,
    ReferenceOr, Schema, SchemaData, SchemaKind, StringType, Type,
};
use serde_json::Value;

use crate::{
    change::{DiffResult, FlagShift},
    context::{Context, Contextual, DiffContext, Position},
    listdiff::ListDiff,
    mapdiff::MapDiff,
};

/// Change record for a pair of schemas present in both documents.
///
/// Only materialized when at least one field differs after irrelevance
/// filtering; schema noise that cannot affect any request or response is not
/// reported.
#[derive(Debug)]
pub struct ChangedSchema {
    /// The context the pair was compared in.
    pub context: DiffContext,
    pub old: Schema,
    pub new: Schema,
    /// The schema's shape changed (e.g. string→integer, object→oneOf).
    /// Always incompatible, regardless of position.
    pub changed_type: bool,
    pub changed_title: bool,
    pub changed_description: bool,
    pub changed_format: bool,
    pub changed_default: bool,
    /// Some other validation constraint changed (pattern, numeric bounds,
    /// array item counts, ...). Classified incompatible: the effect cannot be
    /// judged without interpreting the constraint.
    pub changed_constraints: bool,
    pub deprecated: FlagShift,
    pub read_only: FlagShift,
    pub write_only: FlagShift,
    /// Diff of the `required` field names, after irrelevance filtering.
    pub required: ListDiff<String>,
    /// Diff of the `enum` values, unified as JSON values across string,
    /// number, and integer enumerations.
    pub enumeration: ListDiff<Value>,
    pub max_length: Option<BoundChange>,
    pub changed_properties: IndexMap<String, ChangedSchema>,
    pub added_properties: IndexMap<String, Schema>,
    pub removed_properties: IndexMap<String, Schema>,
    pub additional_properties: Option<Box<ChangedSchema>>,
    /// Diff of the item schema for array types.
    pub items: Option<Box<ChangedSchema>>,
    pub one_of: Option<ChangedOneOf>,
    /// The discriminator property changed. Always incompatible.
    pub discriminator_changed: bool,
    /// A localized note for a pairing the engine cannot reconcile (e.g. two
    /// `allOf` compositions with different members). Classified incompatible;
    /// the rest of the document continues to be diffed.
    pub anomaly: Option<String>,
}

impl ChangedSchema {
    fn new(context: DiffContext, old: Schema, new: Schema) -> Self {
        Self {
            context,
            old,
            new,
            changed_type: false,
            changed_title: false,
            changed_description: false,
            changed_format: false,
            changed_default: false,
            changed_constraints: false,
            deprecated: FlagShift::Unchanged,
            read_only: FlagShift::Unchanged,
            write_only: FlagShift::Unchanged,
            required: ListDiff::default(),
            enumeration: ListDiff::default(),
            max_length: None,
            changed_properties: IndexMap::new(),
            added_properties: IndexMap::new(),
            removed_properties: IndexMap::new(),
            additional_properties: None,
            items: None,
            one_of: None,
            discriminator_changed: false,
            anomaly: None,
        }
    }

    pub fn is_changed(&self) -> bool {
        self.changed_type
            || self.changed_title
            || self.changed_description
            || self.changed_format
            || self.changed_default
            || self.changed_constraints
            || !self.deprecated.is_unchanged()
            || !self.read_only.is_unchanged()
            || !self.write_only.is_unchanged()
            || !self.required.is_unchanged()
            || !self.enumeration.is_unchanged()
            || self.max_length.is_some()
            || !self.changed_properties.is_empty()
            || !self.added_properties.is_empty()
            || !self.removed_properties.is_empty()
            || self.additional_properties.is_some()
            || self.items.is_some()
            || self.one_of.is_some()
            || self.discriminator_changed
            || self.anomaly.is_some()
    }

    pub fn result(&self) -> DiffResult {
        if !self.is_changed() {
            return DiffResult::NoChange;
        }
        if self.changed_type
            || self.discriminator_changed
            || self.changed_constraints
            || self.anomaly.is_some()
        {
            return DiffResult::Incompatible;
        }

        let compatible = match self.context.position {
            // Clients send data matching this schema: removing an allowed
            // enum value or requiring a new field breaks existing senders.
            Position::Request => {
                self.enumeration.missing.is_empty()
                    && self.required.increased.is_empty()
                    && self
                        .max_length
                        .map_or(true, |bound| bound.request_compatible())
            }
            // Servers emit data matching this schema: an unexpected enum
            // value or a vanished property breaks existing consumers.
            Position::Response => {
                self.enumeration.increased.is_empty()
                    && self.removed_properties.is_empty()
                    && self
                        .max_length
                        .map_or(true, |bound| bound.response_compatible())
            }
        };
        if !compatible {
            return DiffResult::Incompatible;
        }

        let children = DiffResult::merge_all(
            self.changed_properties
                .values()
                .map(ChangedSchema::result)
                .chain(
                    self.additional_properties
                        .as_deref()
                        .map(ChangedSchema::result),
                )
                .chain(self.items.as_deref().map(ChangedSchema::result))
                .chain(
                    self.one_of
                        .as_ref()
                        .map(|one_of| one_of.result(self.context.position)),
                ),
        );
        if children.is_incompatible() {
            DiffResult::Incompatible
        } else {
            // This node did change, so the overall outcome is at least
            // Compatible even if every child reports NoChange.
            DiffResult::Compatible
        }
    }
}

/// A `maxLength` bound transition.
///
/// When one side is absent: introducing any bound tightens the schema
/// (breaks request senders), dropping a bound loosens it (breaks response
/// consumers that sized for the old bound).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundChange {
    pub old: Option<usize>,
    pub new: Option<usize>,
}

impl BoundChange {
    pub fn request_compatible(&self) -> bool {
        match (self.old, self.new) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(old), Some(new)) => old <= new,
        }
    }

    pub fn response_compatible(&self) -> bool {
        match (self.old, self.new) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(old), Some(new)) => new <= old,
        }
    }
}

/// Aggregate diff of a `oneOf` composition, keyed by discriminator-mapping
/// name when both sides carry one, else by position.
#[derive(Debug)]
pub struct ChangedOneOf {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: IndexMap<String, ChangedSchema>,
}

impl ChangedOneOf {
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    pub fn result(&self, position: Position) -> DiffResult {
        // Variants behave like enum values made of schemas: a removed
        // alternative breaks senders, an added one breaks consumers.
        let own = match position {
            Position::Request if !self.removed.is_empty() => DiffResult::Incompatible,
            Position::Response if !self.added.is_empty() => DiffResult::Incompatible,
            _ if !self.added.is_empty() || !self.removed.is_empty() => DiffResult::Compatible,
            _ => DiffResult::NoChange,
        };

        own.merge(DiffResult::merge_all(
            self.changed.values().map(ChangedSchema::result),
        ))
    }
}

/// The recursive engine. One instance lives for one comparison run and
/// carries the path-scoped visited set and the recursion depth guard.
pub(crate) struct SchemaDiffer {
    visited: BTreeSet<(String, String)>,
    depth: usize,
    max_depth: usize,
}

impl SchemaDiffer {
    pub fn new(max_depth: usize) -> Self {
        Self {
            visited: BTreeSet::new(),
            depth: 0,
            max_depth,
        }
    }

    /// Compare two possibly-referenced schemas. Returns `None` when nothing
    /// relevant differs.
    pub fn diff_ref(
        &mut self,
        old: Contextual<'_, &ReferenceOr<Schema>>,
        new: Contextual<'_, &ReferenceOr<Schema>>,
        context: DiffContext,
    ) -> anyhow::Result<Option<ChangedSchema>> {
        if self.depth >= self.max_depth {
            bail!(
                "maximum schema recursion depth {} exceeded at {}",
                self.max_depth,
                old.context().path,
            );
        }
        self.depth += 1;
        let result = self.diff_ref_inner(old, new, context);
        self.depth -= 1;
        result
    }

    fn diff_ref_inner(
        &mut self,
        old: Contextual<'_, &ReferenceOr<Schema>>,
        new: Contextual<'_, &ReferenceOr<Schema>>,
        context: DiffContext,
    ) -> anyhow::Result<Option<ChangedSchema>> {
        if let (
            ReferenceOr::Reference { reference: old_ref },
            ReferenceOr::Reference { reference: new_ref },
        ) = (old.as_ref(), new.as_ref())
        {
            let key = (old_ref.clone(), new_ref.clone());
            if !self.visited.insert(key.clone()) {
                // This reference pair is already being compared further up
                // the current path: a cycle, not an error. The visited set is
                // path-scoped (removed below), so the same pair reached in a
                // sibling position is still diffed.
                log::trace!("cycle through ({old_ref}, {new_ref}), stopping descent");
                return Ok(None);
            }
            let result = self.resolve_and_diff(old, new, context);
            self.visited.remove(&key);
            result
        } else {
            self.resolve_and_diff(old, new, context)
        }
    }

    fn resolve_and_diff(
        &mut self,
        old: Contextual<'_, &ReferenceOr<Schema>>,
        new: Contextual<'_, &ReferenceOr<Schema>>,
        context: DiffContext,
    ) -> anyhow::Result<Option<ChangedSchema>> {
        let (old_schema, old_context) = old.contextual_resolve()?;
        let (new_schema, new_context) = new.contextual_resolve()?;

        self.diff_schema(
            Contextual::new(old_context, &*old_schema),
            Contextual::new(new_context, &*new_schema),
            context,
        )
    }

    fn diff_schema(
        &mut self,
        old: Contextual<'_, &Schema>,
        new: Contextual<'_, &Schema>,
        context: DiffContext,
    ) -> anyhow::Result<Option<ChangedSchema>> {
        log::trace!("comparing schemas at {} / {}", old.context().path, new.context().path);

        // Expand both sides fully so a newly-added field cannot be missed.
        let Schema {
            schema_data:
                SchemaData {
                    nullable: old_nullable,
                    read_only: old_read_only,
                    write_only: old_write_only,
                    deprecated: old_deprecated,
                    external_docs: _,
                    example: _,
                    title: old_title,
                    description: old_description,
                    discriminator: old_discriminator,
                    default: old_default,
                    extensions: _,
                },
            schema_kind: old_kind,
        } = old.as_ref();
        let Schema {
            schema_data:
                SchemaData {
                    nullable: new_nullable,
                    read_only: new_read_only,
                    write_only: new_write_only,
                    deprecated: new_deprecated,
                    external_docs: _,
                    example: _,
                    title: new_title,
                    description: new_description,
                    discriminator: new_discriminator,
                    default: new_default,
                    extensions: _,
                },
            schema_kind: new_kind,
        } = new.as_ref();

        let mut changed =
            ChangedSchema::new(context, (*old.as_ref()).clone(), (*new.as_ref()).clone());

        changed.changed_title = old_title != new_title;
        changed.changed_description = old_description != new_description;
        changed.changed_default = old_default != new_default;
        changed.deprecated = FlagShift::of(*old_deprecated, *new_deprecated);
        changed.read_only = FlagShift::of(*old_read_only, *new_read_only);
        changed.write_only = FlagShift::of(*old_write_only, *new_write_only);
        changed.discriminator_changed = discriminator_property(old_discriminator.as_ref())
            != discriminator_property(new_discriminator.as_ref());

        // Nullability is a constraint on the serialized form, not metadata.
        if old_nullable != new_nullable {
            changed.changed_constraints = true;
        }

        self.diff_kind(
            &mut changed,
            old.subcomponent(old_kind),
            new.subcomponent(new_kind),
            old_discriminator.as_ref(),
            new_discriminator.as_ref(),
            context,
        )?;

        Ok(changed.is_changed().then_some(changed))
    }

    fn diff_kind(
        &mut self,
        changed: &mut ChangedSchema,
        old: Contextual<'_, &SchemaKind>,
        new: Contextual<'_, &SchemaKind>,
        old_discriminator: Option<&Discriminator>,
        new_discriminator: Option<&Discriminator>,
        context: DiffContext,
    ) -> anyhow::Result<()> {
        match (old.as_ref(), new.as_ref()) {
            (SchemaKind::Type(old_type), SchemaKind::Type(new_type)) => self.diff_type(
                changed,
                old.subcomponent(old_type),
                new.subcomponent(new_type),
                context,
            ),
            (SchemaKind::OneOf { one_of: old_one_of }, SchemaKind::OneOf { one_of: new_one_of }) => {
                self.diff_one_of(
                    changed,
                    old.append_deref(old_one_of, "oneOf"),
                    new.append_deref(new_one_of, "oneOf"),
                    old_discriminator,
                    new_discriminator,
                    context,
                )
            }
            (SchemaKind::Not { not: old_not }, SchemaKind::Not { not: new_not }) => {
                let old_not = old.append_deref(old_not.as_ref(), "not");
                let new_not = new.append_deref(new_not.as_ref(), "not");
                // A negated constraint that changed at all is not something
                // the direction rules can reason about.
                if self.diff_ref(old_not, new_not, context)?.is_some() {
                    changed.changed_constraints = true;
                }
                Ok(())
            }
            (SchemaKind::AllOf { all_of: old_all_of }, SchemaKind::AllOf { all_of: new_all_of }) => {
                if old_all_of != new_all_of {
                    changed.anomaly = Some(format!(
                        "allOf composition changed at {}; members are not compared pairwise",
                        new.context().path,
                    ));
                }
                Ok(())
            }
            (SchemaKind::AnyOf { any_of: old_any_of }, SchemaKind::AnyOf { any_of: new_any_of }) => {
                if old_any_of != new_any_of {
                    changed.anomaly = Some(format!(
                        "anyOf composition changed at {}; members are not compared pairwise",
                        new.context().path,
                    ));
                }
                Ok(())
            }
            (SchemaKind::Any(old_any), SchemaKind::Any(new_any)) => {
                if old_any != new_any {
                    changed.anomaly = Some(format!(
                        "untyped schema changed at {}",
                        new.context().path,
                    ));
                }
                Ok(())
            }
            _ => {
                changed.changed_type = true;
                Ok(())
            }
        }
    }

    fn diff_type(
        &mut self,
        changed: &mut ChangedSchema,
        old: Contextual<'_, &Type>,
        new: Contextual<'_, &Type>,
        context: DiffContext,
    ) -> anyhow::Result<()> {
        match (old.as_ref(), new.as_ref()) {
            (Type::String(old_string), Type::String(new_string)) => {
                let StringType {
                    format: old_format,
                    pattern: old_pattern,
                    enumeration: old_enumeration,
                    min_length: old_min_length,
                    max_length: old_max_length,
                } = old_string;
                let StringType {
                    format: new_format,
                    pattern: new_pattern,
                    enumeration: new_enumeration,
                    min_length: new_min_length,
                    max_length: new_max_length,
                } = new_string;

                changed.changed_format = old_format != new_format;
                changed.enumeration = ListDiff::diff(
                    Some(&string_enum(old_enumeration)),
                    Some(&string_enum(new_enumeration)),
                );
                if old_max_length != new_max_length {
                    changed.max_length = Some(BoundChange {
                        old: *old_max_length,
                        new: *new_max_length,
                    });
                }
                if old_pattern != new_pattern || old_min_length != new_min_length {
                    changed.changed_constraints = true;
                }
                Ok(())
            }
            (Type::Number(old_number), Type::Number(new_number)) => {
                let NumberType {
                    format: old_format,
                    multiple_of: old_multiple_of,
                    exclusive_minimum: old_exclusive_minimum,
                    exclusive_maximum: old_exclusive_maximum,
                    minimum: old_minimum,
                    maximum: old_maximum,
                    enumeration: old_enumeration,
                } = old_number;
                let NumberType {
                    format: new_format,
                    multiple_of: new_multiple_of,
                    exclusive_minimum: new_exclusive_minimum,
                    exclusive_maximum: new_exclusive_maximum,
                    minimum: new_minimum,
                    maximum: new_maximum,
                    enumeration: new_enumeration,
                } = new_number;

                changed.changed_format = old_format != new_format;
                changed.enumeration = ListDiff::diff(
                    Some(&number_enum(old_enumeration)),
                    Some(&number_enum(new_enumeration)),
                );
                if old_multiple_of != new_multiple_of
                    || old_exclusive_minimum != new_exclusive_minimum
                    || old_exclusive_maximum != new_exclusive_maximum
                    || old_minimum != new_minimum
                    || old_maximum != new_maximum
                {
                    changed.changed_constraints = true;
                }
                Ok(())
            }
            (Type::Integer(old_integer), Type::Integer(new_integer)) => {
                let IntegerType {
                    format: old_format,
                    multiple_of: old_multiple_of,
                    exclusive_minimum: old_exclusive_minimum,
                    exclusive_maximum: old_exclusive_maximum,
                    minimum: old_minimum,
                    maximum: old_maximum,
                    enumeration: old_enumeration,
                } = old_integer;
                let IntegerType {
                    format: new_format,
                    multiple_of: new_multiple_of,
                    exclusive_minimum: new_exclusive_minimum,
                    exclusive_maximum: new_exclusive_maximum,
                    minimum: new_minimum,
                    maximum: new_maximum,
                    enumeration: new_enumeration,
                } = new_integer;

                changed.changed_format = old_format != new_format;
                changed.enumeration = ListDiff::diff(
                    Some(&integer_enum(old_enumeration)),
                    Some(&integer_enum(new_enumeration)),
                );
                if old_multiple_of != new_multiple_of
                    || old_exclusive_minimum != new_exclusive_minimum
                    || old_exclusive_maximum != new_exclusive_maximum
                    || old_minimum != new_minimum
                    || old_maximum != new_maximum
                {
                    changed.changed_constraints = true;
                }
                Ok(())
            }
            (Type::Boolean(old_boolean), Type::Boolean(new_boolean)) => {
                if old_boolean != new_boolean {
                    changed.changed_constraints = true;
                }
                Ok(())
            }
            (Type::Array(old_array), Type::Array(new_array)) => {
                self.diff_array(changed, old, new, old_array, new_array, context)
            }
            (Type::Object(old_object), Type::Object(new_object)) => {
                self.diff_object(changed, old, new, old_object, new_object, context)
            }
            _ => {
                changed.changed_type = true;
                Ok(())
            }
        }
    }

    fn diff_array(
        &mut self,
        changed: &mut ChangedSchema,
        old: Contextual<'_, &Type>,
        new: Contextual<'_, &Type>,
        old_array: &ArrayType,
        new_array: &ArrayType,
        context: DiffContext,
    ) -> anyhow::Result<()> {
        let ArrayType {
            items: old_items,
            min_items: old_min_items,
            max_items: old_max_items,
            unique_items: old_unique_items,
        } = old_array;
        let ArrayType {
            items: new_items,
            min_items: new_min_items,
            max_items: new_max_items,
            unique_items: new_unique_items,
        } = new_array;

        if old_min_items != new_min_items
            || old_max_items != new_max_items
            || old_unique_items != new_unique_items
        {
            changed.changed_constraints = true;
        }

        match (old_items, new_items) {
            (Some(old_items), Some(new_items)) => {
                let old_item_schema = old_items.clone().unbox();
                let new_item_schema = new_items.clone().unbox();
                let old_items = old.append_deref(&old_item_schema, "items");
                let new_items = new.append_deref(&new_item_schema, "items");
                if let Some(items) = self.diff_ref(old_items, new_items, context)? {
                    changed.items = Some(Box::new(items));
                }
            }
            (None, None) => {}
            _ => {
                changed.changed_constraints = true;
            }
        }

        Ok(())
    }

    fn diff_object(
        &mut self,
        changed: &mut ChangedSchema,
        old: Contextual<'_, &Type>,
        new: Contextual<'_, &Type>,
        old_object: &ObjectType,
        new_object: &ObjectType,
        context: DiffContext,
    ) -> anyhow::Result<()> {
        let ObjectType {
            properties: old_properties,
            required: old_required,
            additional_properties: old_additional_properties,
            min_properties: old_min_properties,
            max_properties: old_max_properties,
        } = old_object;
        let ObjectType {
            properties: new_properties,
            required: new_required,
            additional_properties: new_additional_properties,
            min_properties: new_min_properties,
            max_properties: new_max_properties,
        } = new_object;

        if old_min_properties != new_min_properties || old_max_properties != new_max_properties {
            changed.changed_constraints = true;
        }

        let property_diff = MapDiff::diff(Some(old_properties), Some(new_properties));

        let old_prop_context = old.context().append("properties");
        let new_prop_context = new.context().append("properties");

        for (name, property) in &property_diff.added {
            let property = property.clone().unbox();
            let contextual =
                Contextual::new(new_prop_context.append(name), &property);
            let (schema, _) = contextual.contextual_resolve()?;
            if context.is_irrelevant(schema.schema_data.read_only, schema.schema_data.write_only) {
                continue;
            }
            changed
                .added_properties
                .insert(name.clone(), schema.into_owned());
        }

        for (name, property) in &property_diff.removed {
            let property = property.clone().unbox();
            let contextual =
                Contextual::new(old_prop_context.append(name), &property);
            let (schema, _) = contextual.contextual_resolve()?;
            if context.is_irrelevant(schema.schema_data.read_only, schema.schema_data.write_only) {
                continue;
            }
            changed
                .removed_properties
                .insert(name.clone(), schema.into_owned());
        }

        for name in &property_diff.shared {
            let (Some(old_property), Some(new_property)) =
                (old_properties.get(name), new_properties.get(name))
            else {
                continue;
            };
            let old_property = old_property.clone().unbox();
            let new_property = new_property.clone().unbox();

            // Requiredness for the child comes from the right-hand document:
            // that is the contract new traffic is held to.
            let child_context = context.with_required(new_required.contains(name));

            let old_property =
                Contextual::new(old_prop_context.append(name), &old_property);
            let new_property =
                Contextual::new(new_prop_context.append(name), &new_property);
            if let Some(property) = self.diff_ref(old_property, new_property, child_context)? {
                changed.changed_properties.insert(name.clone(), property);
            }
        }

        changed.required = filtered_required_diff(
            old_required,
            new_required,
            old_properties,
            new_properties,
            &old_prop_context,
            &new_prop_context,
            context,
        )?;

        match (old_additional_properties, new_additional_properties) {
            (
                Some(AdditionalProperties::Schema(old_ap)),
                Some(AdditionalProperties::Schema(new_ap)),
            ) => {
                let old_ap = Contextual::new(
                    old.context().append("additionalProperties"),
                    old_ap.as_ref(),
                );
                let new_ap = Contextual::new(
                    new.context().append("additionalProperties"),
                    new_ap.as_ref(),
                );
                // Additional properties are never themselves required.
                if let Some(diff) =
                    self.diff_ref(old_ap, new_ap, context.with_required(false))?
                {
                    changed.additional_properties = Some(Box::new(diff));
                }
            }
            (Some(AdditionalProperties::Any(false)), Some(AdditionalProperties::Any(false))) => {}
            // Absent is equivalent to `true`.
            (
                None | Some(AdditionalProperties::Any(true)),
                None | Some(AdditionalProperties::Any(true)),
            ) => {}
            _ => {
                changed.changed_constraints = true;
            }
        }

        Ok(())
    }

    fn diff_one_of(
        &mut self,
        changed: &mut ChangedSchema,
        old: Contextual<'_, &Vec<ReferenceOr<Schema>>>,
        new: Contextual<'_, &Vec<ReferenceOr<Schema>>>,
        old_discriminator: Option<&Discriminator>,
        new_discriminator: Option<&Discriminator>,
        context: DiffContext,
    ) -> anyhow::Result<()> {
        let old_keyed = one_of_keys(old.as_ref(), old_discriminator);
        let new_keyed = one_of_keys(new.as_ref(), new_discriminator);

        let variant_diff = MapDiff::diff(Some(&old_keyed), Some(&new_keyed));

        let mut one_of = ChangedOneOf {
            added: variant_diff.added.keys().cloned().collect(),
            removed: variant_diff.removed.keys().cloned().collect(),
            changed: IndexMap::new(),
        };

        for key in &variant_diff.shared {
            let (Some(old_variant), Some(new_variant)) =
                (old_keyed.get(key), new_keyed.get(key))
            else {
                continue;
            };

            let old_variant = old.append_deref(old_variant, key);
            let new_variant = new.append_deref(new_variant, key);
            if let Some(diff) = self.diff_ref(old_variant, new_variant, context)? {
                one_of.changed.insert(key.clone(), diff);
            }
        }

        if one_of.is_changed() {
            changed.one_of = Some(one_of);
        }
        Ok(())
    }
}

/// Diff `required` lists, excluding names whose property cannot appear on
/// the wire in this direction.
fn filtered_required_diff(
    old_required: &[String],
    new_required: &[String],
    old_properties: &IndexMap<String, ReferenceOr<Box<Schema>>>,
    new_properties: &IndexMap<String, ReferenceOr<Box<Schema>>>,
    old_prop_context: &Context<'_>,
    new_prop_context: &Context<'_>,
    context: DiffContext,
) -> anyhow::Result<ListDiff<String>> {
    let raw = ListDiff::diff(Some(old_required), Some(new_required));

    let mut filtered = ListDiff::default();
    for name in raw.increased {
        let irrelevant = match new_properties.get(&name) {
            Some(property) => {
                let property = property.clone().unbox();
                let contextual = Contextual::new(new_prop_context.append(&name), &property);
                let (schema, _) = contextual.contextual_resolve()?;
                context.is_irrelevant(schema.schema_data.read_only, schema.schema_data.write_only)
            }
            None => false,
        };
        if !irrelevant {
            filtered.increased.push(name);
        }
    }
    for name in raw.missing {
        let irrelevant = match old_properties.get(&name) {
            Some(property) => {
                let property = property.clone().unbox();
                let contextual = Contextual::new(old_prop_context.append(&name), &property);
                let (schema, _) = contextual.contextual_resolve()?;
                context.is_irrelevant(schema.schema_data.read_only, schema.schema_data.write_only)
            }
            None => false,
        };
        if !irrelevant {
            filtered.missing.push(name);
        }
    }

    Ok(filtered)
}

fn discriminator_property(discriminator: Option<&Discriminator>) -> Option<&str> {
    discriminator.map(|d| d.property_name.as_str())
}

/// Key `oneOf` variants for matching across documents: by discriminator
/// mapping name when the variant is a reference named in the mapping, by
/// position otherwise.
fn one_of_keys<'a>(
    variants: &'a [ReferenceOr<Schema>],
    discriminator: Option<&Discriminator>,
) -> IndexMap<String, ReferenceOr<Schema>> {
    let mapping = discriminator.map(|d| &d.mapping);

    variants
        .iter()
        .enumerate()
        .map(|(index, variant)| {
            let mapped = match (&variant, mapping) {
                (ReferenceOr::Reference { reference }, Some(mapping)) => mapping
                    .iter()
                    .find(|(_, target)| *target == reference)
                    .map(|(name, _)| name.clone()),
                _ => None,
            };
            (mapped.unwrap_or_else(|| index.to_string()), variant.clone())
        })
        .collect()
}

fn string_enum(values: &[Option<String>]) -> Vec<Value> {
    values
        .iter()
        .map(|value| value.as_ref().map_or(Value::Null, |v| Value::from(v.clone())))
        .collect()
}

fn number_enum(values: &[Option<f64>]) -> Vec<Value> {
    values
        .iter()
        .map(|value| value.map_or(Value::Null, Value::from))
        .collect()
}

fn integer_enum(values: &[Option<i64>]) -> Vec<Value> {
    values
        .iter()
        .map(|value| value.map_or(Value::Null, Value::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use openapiv3::{ReferenceOr, Schema};
    use serde_json::{json, Value};

    use crate::{
        change::DiffResult,
        context::{Context, Contextual, DiffContext, Position},
        schema::{BoundChange, SchemaDiffer},
    };

    fn component_ref(name: &str) -> ReferenceOr<Schema> {
        ReferenceOr::Reference {
            reference: format!("#/components/schemas/{name}"),
        }
    }

    fn diff_component(
        old_doc: &Value,
        new_doc: &Value,
        name: &str,
        position: Position,
    ) -> Option<crate::schema::ChangedSchema> {
        let old_context = Context::new(old_doc);
        let new_context = Context::new(new_doc);
        let old_ref = component_ref(name);
        let new_ref = component_ref(name);

        let mut differ = SchemaDiffer::new(128);
        differ
            .diff_ref(
                Contextual::new(old_context, &old_ref),
                Contextual::new(new_context, &new_ref),
                DiffContext::new(position),
            )
            .expect("comparison should not fail")
    }

    fn node_doc(leaf_type: &str) -> Value {
        json!({
            "components": {
                "schemas": {
                    "Node": {
                        "type": "object",
                        "properties": {
                            "value": { "type": leaf_type },
                            "next": { "$ref": "#/components/schemas/Node" }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_self_referential_identity_terminates() {
        let doc = node_doc("string");
        assert!(diff_component(&doc, &doc, "Node", Position::Request).is_none());
    }

    #[test]
    fn test_self_referential_leaf_change_terminates() {
        let old = node_doc("string");
        let new = node_doc("integer");

        let changed = diff_component(&old, &new, "Node", Position::Request)
            .expect("leaf type change must be reported");
        assert_eq!(changed.result(), DiffResult::Incompatible);
        assert!(changed.changed_properties.contains_key("value"));
    }

    #[test]
    fn test_sibling_references_both_diffed() {
        // The same component referenced from two sibling properties: the
        // visited set must not suppress the second occurrence.
        let doc = |fmt: &str| {
            json!({
                "components": {
                    "schemas": {
                        "Wrapper": {
                            "type": "object",
                            "properties": {
                                "first": { "$ref": "#/components/schemas/Leaf" },
                                "second": { "$ref": "#/components/schemas/Leaf" }
                            }
                        },
                        "Leaf": { "type": "string", "format": fmt }
                    }
                }
            })
        };

        let changed = diff_component(&doc("uuid"), &doc("uri"), "Wrapper", Position::Request)
            .expect("format change must be reported");
        assert!(changed.changed_properties.contains_key("first"));
        assert!(changed.changed_properties.contains_key("second"));
    }

    #[test]
    fn test_required_asymmetry() {
        let doc = |required: bool| {
            let mut schema = json!({
                "type": "object",
                "properties": { "name": { "type": "string" } }
            });
            if required {
                schema["required"] = json!(["name"]);
            }
            json!({ "components": { "schemas": { "Thing": schema } } })
        };

        let request = diff_component(&doc(false), &doc(true), "Thing", Position::Request)
            .expect("required change must be reported");
        assert_eq!(request.required.increased, ["name"]);
        assert_eq!(request.result(), DiffResult::Incompatible);

        let response = diff_component(&doc(false), &doc(true), "Thing", Position::Response)
            .expect("required change must be reported");
        assert_eq!(response.result(), DiffResult::Compatible);
    }

    #[test]
    fn test_read_only_removal_filtered_by_position() {
        let with_id = json!({
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "id": { "type": "string", "readOnly": true }
                        }
                    }
                }
            }
        });
        let without_id = json!({
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": { "name": { "type": "string" } }
                    }
                }
            }
        });

        // A readOnly property never appears in a request: removing it is not
        // reportable there.
        assert!(diff_component(&with_id, &without_id, "Pet", Position::Request).is_none());

        let response = diff_component(&with_id, &without_id, "Pet", Position::Response)
            .expect("removed response property must be reported");
        assert!(response.removed_properties.contains_key("id"));
        assert_eq!(response.result(), DiffResult::Incompatible);
    }

    #[test]
    fn test_enum_asymmetry() {
        let doc = |values: &[&str]| {
            json!({
                "components": {
                    "schemas": {
                        "Color": { "type": "string", "enum": values }
                    }
                }
            })
        };

        // Removing an allowed value breaks senders, not consumers.
        let shrunk_request =
            diff_component(&doc(&["red", "blue"]), &doc(&["red"]), "Color", Position::Request)
                .unwrap();
        assert_eq!(shrunk_request.result(), DiffResult::Incompatible);

        let shrunk_response =
            diff_component(&doc(&["red", "blue"]), &doc(&["red"]), "Color", Position::Response)
                .unwrap();
        assert_eq!(shrunk_response.result(), DiffResult::Compatible);

        // Adding a value breaks consumers, not senders.
        let grown_request =
            diff_component(&doc(&["red"]), &doc(&["red", "blue"]), "Color", Position::Request)
                .unwrap();
        assert_eq!(grown_request.result(), DiffResult::Compatible);

        let grown_response =
            diff_component(&doc(&["red"]), &doc(&["red", "blue"]), "Color", Position::Response)
                .unwrap();
        assert_eq!(grown_response.result(), DiffResult::Incompatible);
    }

    #[test]
    fn test_type_change_incompatible_in_both_positions() {
        let doc = |ty: &str| {
            json!({ "components": { "schemas": { "V": { "type": ty } } } })
        };

        for position in [Position::Request, Position::Response] {
            let changed = diff_component(&doc("string"), &doc("integer"), "V", position).unwrap();
            assert!(changed.changed_type);
            assert_eq!(changed.result(), DiffResult::Incompatible);
        }
    }

    #[test]
    fn test_max_length_policy() {
        // Request: tightening or introducing a bound breaks senders.
        assert!(!BoundChange { old: None, new: Some(10) }.request_compatible());
        assert!(!BoundChange { old: Some(20), new: Some(10) }.request_compatible());
        assert!(BoundChange { old: Some(10), new: Some(20) }.request_compatible());
        assert!(BoundChange { old: Some(10), new: None }.request_compatible());

        // Response: loosening or dropping a bound breaks sized consumers.
        assert!(!BoundChange { old: Some(10), new: None }.response_compatible());
        assert!(!BoundChange { old: Some(10), new: Some(20) }.response_compatible());
        assert!(BoundChange { old: Some(20), new: Some(10) }.response_compatible());
        assert!(BoundChange { old: None, new: Some(10) }.response_compatible());
    }

    #[test]
    fn test_depth_limit_fails_fast() {
        let doc = node_doc("string");
        let context = Context::new(&doc);
        let reference = component_ref("Node");

        // A limit of zero cannot even begin the walk; the point is that the
        // failure is an error rather than a hang or overflow.
        let mut differ = SchemaDiffer::new(0);
        let err = differ
            .diff_ref(
                Contextual::new(context.clone(), &reference),
                Contextual::new(context, &reference),
                DiffContext::new(Position::Request),
            )
            .unwrap_err();
        assert!(err.to_string().contains("recursion depth"));
    }
}
