//! Schema descriptors for persisted model types.
//!
//! Every model type is described once, up front, by a [`ModelSchema`] and
//! registered in a [`SchemaRegistry`]. The registry resolves relation pairs
//! and derives the ownership flags the persistor relies on:
//!
//! - a `hasOne` is one-to-one iff its opposite is a `hasOne`; a `hasOne` that
//!   is not one-to-one always holds the key column,
//! - a `hasMany` is many-to-one iff its opposite is a `hasOne`, otherwise it is
//!   many-to-many and backed by a derived join table,
//! - exactly one side of a one-to-one pair holds the key.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Model;
use crate::naming::{self, JoinTable};
use crate::types::SqlType;

/// Cardinality of a relation field, as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The field holds at most one model.
    HasOne,
    /// The field holds a collection of models.
    HasMany,
}

/// What happens to related rows when the owner is destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadePolicy {
    /// Leave related rows alone.
    #[default]
    None,
    /// Destroy related models.
    Delete,
    /// Null out the column pointing at the destroyed model.
    Nullify,
}

/// A plain column-backed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Field name.
    pub name: String,
    /// Column name.
    pub column: String,
    /// Declared type.
    pub sql_type: SqlType,
}

impl AttributeInfo {
    /// Create an attribute whose column is the snake_case field name.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        Self {
            column: naming::column_name(&name),
            name,
            sql_type,
        }
    }

    /// Override the column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

/// A `through` relation: traverse `via`, then `target_field` on each result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    /// Relation field on this model.
    pub via: String,
    /// Relation field on the `via` target.
    pub target_field: String,
}

/// Metadata about one relation field.
///
/// Built with [`RelationInfo::has_one`] / [`RelationInfo::has_many`] and the
/// chained setters; the derived flags are filled in by
/// [`SchemaRegistryBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    /// Field name.
    pub name: String,
    /// Column backing the field (key column for key-owning `hasOne`).
    pub column: String,
    /// Declared cardinality.
    pub kind: RelationKind,
    /// Target model type.
    pub target: String,
    /// Field on the target pointing back, if any.
    pub opposite: Option<String>,
    /// Whether this side stores the key column.
    pub has_key: bool,
    /// Cascade policy applied on destroy.
    pub dependent: CascadePolicy,
    /// Embedded collections are never walked by writes.
    pub embedded: bool,
    /// Traversal definition for `through` fields.
    pub through: Option<Through>,

    /// Derived: `hasOne` whose opposite is a `hasOne`.
    pub one_to_one: bool,
    /// Derived: `hasMany` whose opposite is a `hasOne`.
    pub many_to_one: bool,
    /// Derived: `hasMany` that is not many-to-one.
    pub many_to_many: bool,
    /// Derived: column of the opposite field on the target table.
    pub opposite_column: Option<String>,
    /// Derived: join table for many-to-many fields.
    pub join: Option<JoinTable>,
}

impl RelationInfo {
    fn new(name: String, target: String, kind: RelationKind) -> Self {
        Self {
            column: naming::column_name(&name),
            name,
            kind,
            target,
            opposite: None,
            has_key: false,
            dependent: CascadePolicy::None,
            embedded: false,
            through: None,
            one_to_one: false,
            many_to_one: false,
            many_to_many: false,
            opposite_column: None,
            join: None,
        }
    }

    /// Declare a single-valued relation to `target`.
    #[must_use]
    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name.into(), target.into(), RelationKind::HasOne)
    }

    /// Declare a collection relation to `target`.
    #[must_use]
    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name.into(), target.into(), RelationKind::HasMany)
    }

    /// Set the field on the target that points back.
    #[must_use]
    pub fn opposite(mut self, field: impl Into<String>) -> Self {
        self.opposite = Some(field.into());
        self
    }

    /// Declare that this side of a one-to-one stores the key column.
    #[must_use]
    pub fn key(mut self) -> Self {
        self.has_key = true;
        self
    }

    /// Set the cascade policy.
    #[must_use]
    pub fn dependent(mut self, policy: CascadePolicy) -> Self {
        self.dependent = policy;
        self
    }

    /// Mark a collection as embedded.
    #[must_use]
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    /// Make this a `through` relation.
    #[must_use]
    pub fn through(mut self, via: impl Into<String>, target_field: impl Into<String>) -> Self {
        self.through = Some(Through {
            via: via.into(),
            target_field: target_field.into(),
        });
        self
    }

    /// Override the column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Whether this is a `hasOne` field.
    #[must_use]
    pub fn is_has_one(&self) -> bool {
        self.kind == RelationKind::HasOne
    }

    /// Whether this is a `hasMany` field.
    #[must_use]
    pub fn is_has_many(&self) -> bool {
        self.kind == RelationKind::HasMany
    }

    /// Whether this field traverses another relation.
    #[must_use]
    pub fn is_through(&self) -> bool {
        self.through.is_some()
    }

    /// Whether this side's table carries a column for the field.
    #[must_use]
    pub fn stores_column(&self) -> bool {
        self.is_has_one() && self.has_key && !self.is_through()
    }
}

/// Index of a field within its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef {
    /// Index into [`ModelSchema::attributes`].
    Attribute(usize),
    /// Index into [`ModelSchema::relations`].
    Relation(usize),
}

/// Descriptor of one model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    type_name: String,
    table: String,
    attributes: Vec<AttributeInfo>,
    relations: Vec<RelationInfo>,
    timestamps: bool,
    datestamps: bool,
}

impl ModelSchema {
    /// Start describing a model type. The table defaults to the pluralized
    /// snake_case type name.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            table: naming::table_name(&type_name),
            type_name,
            attributes: Vec::new(),
            relations: Vec::new(),
            timestamps: false,
            datestamps: false,
        }
    }

    /// Override the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Add an attribute.
    #[must_use]
    pub fn attribute(mut self, attribute: AttributeInfo) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Shorthand for [`ModelSchema::attribute`] with the default column name.
    #[must_use]
    pub fn attr(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.attribute(AttributeInfo::new(name, sql_type))
    }

    /// Add a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationInfo) -> Self {
        self.relations.push(relation);
        self
    }

    /// Maintain `created_at` / `updated_at` as epoch milliseconds.
    #[must_use]
    pub fn timestamps(mut self) -> Self {
        if !self.timestamps {
            self.timestamps = true;
            self.attributes
                .push(AttributeInfo::new(naming::CREATED_AT, SqlType::BigInt));
            self.attributes
                .push(AttributeInfo::new(naming::UPDATED_AT, SqlType::BigInt));
        }
        self
    }

    /// Maintain `created_on` / `updated_on` as server-side dates.
    #[must_use]
    pub fn datestamps(mut self) -> Self {
        if !self.datestamps {
            self.datestamps = true;
            self.attributes
                .push(AttributeInfo::new(naming::CREATED_ON, SqlType::Date));
            self.attributes
                .push(AttributeInfo::new(naming::UPDATED_ON, SqlType::Date));
        }
        self
    }

    /// Model type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Attribute fields, in declaration order.
    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    /// Relation fields, in declaration order.
    pub fn relations(&self) -> &[RelationInfo] {
        &self.relations
    }

    /// Whether epoch-millis stamps are maintained.
    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Whether date stamps are maintained.
    pub fn has_datestamps(&self) -> bool {
        self.datestamps
    }

    /// Number of fields (attributes then relations).
    pub fn field_count(&self) -> usize {
        self.attributes.len() + self.relations.len()
    }

    /// Locate a field by name.
    pub fn field(&self, name: &str) -> Option<FieldRef> {
        if let Some(idx) = self.attributes.iter().position(|a| a.name == name) {
            return Some(FieldRef::Attribute(idx));
        }
        self.relations
            .iter()
            .position(|r| r.name == name)
            .map(FieldRef::Relation)
    }

    /// Slot index of a field in a model's value storage.
    pub fn slot(&self, field: FieldRef) -> usize {
        match field {
            FieldRef::Attribute(idx) => idx,
            FieldRef::Relation(idx) => self.attributes.len() + idx,
        }
    }

    /// Attribute by field name.
    pub fn attribute_named(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Relation by field name.
    pub fn relation_named(&self, name: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Relation by field name, or a schema error.
    pub fn require_relation(&self, name: &str) -> Result<&RelationInfo> {
        self.relation_named(name).ok_or_else(|| {
            Error::schema(format!(
                "{} has no relation field named {name}",
                self.type_name
            ))
        })
    }

    /// Key-owning `hasOne` relation whose column is `column` (case-insensitive).
    pub fn key_relation_for_column(&self, column: &str) -> Option<&RelationInfo> {
        self.relations
            .iter()
            .find(|r| r.stores_column() && r.column.eq_ignore_ascii_case(column))
    }

    /// Attribute whose column is `column` (case-insensitive).
    pub fn attribute_for_column(&self, column: &str) -> Option<&AttributeInfo> {
        self.attributes
            .iter()
            .find(|a| a.column.eq_ignore_ascii_case(column))
    }
}

/// All registered model types, with relation flags resolved.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    models: Vec<Arc<ModelSchema>>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Start a registry.
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Schema for a model type.
    pub fn schema(&self, type_name: &str) -> Result<&Arc<ModelSchema>> {
        self.by_name
            .get(type_name)
            .and_then(|idx| self.models.get(*idx))
            .ok_or_else(|| Error::schema(format!("unknown model type: {type_name}")))
    }

    /// Create a new, empty model of a registered type.
    pub fn model(&self, type_name: &str) -> Result<Model> {
        Ok(Model::new(Arc::clone(self.schema(type_name)?)))
    }

    /// Whether a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.by_name.contains_key(type_name)
    }

    /// Registered schemas, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelSchema>> {
        self.models.iter()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The relation on the target type pointing back at `relation`, if any.
    pub fn opposite_of(&self, relation: &RelationInfo) -> Result<Option<&RelationInfo>> {
        match &relation.opposite {
            Some(opposite) => Ok(Some(
                self.schema(&relation.target)?.require_relation(opposite)?,
            )),
            None => Ok(None),
        }
    }
}

/// Collects model schemas and validates them into a [`SchemaRegistry`].
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    models: Vec<ModelSchema>,
}

impl SchemaRegistryBuilder {
    /// Register a model type.
    #[must_use]
    pub fn model(mut self, schema: ModelSchema) -> Self {
        self.models.push(schema);
        self
    }

    /// Resolve relations and derive ownership flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] for duplicate types or fields, unknown
    /// targets or opposites, one-to-one pairs without exactly one key owner,
    /// invalid `through` paths, and self-referencing many-to-many fields whose
    /// join columns would collide.
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut by_name = HashMap::with_capacity(self.models.len());
        for (idx, model) in self.models.iter().enumerate() {
            if by_name.insert(model.type_name.clone(), idx).is_some() {
                return Err(Error::schema(format!(
                    "model type registered twice: {}",
                    model.type_name
                )));
            }
            check_unique_fields(model)?;
        }

        let mut resolved = self.models.clone();
        for (model_idx, model) in self.models.iter().enumerate() {
            for (rel_idx, rel) in model.relations.iter().enumerate() {
                let target = by_name
                    .get(&rel.target)
                    .and_then(|idx| self.models.get(*idx))
                    .ok_or_else(|| {
                        Error::schema(format!(
                            "{}.{} targets unknown model type {}",
                            model.type_name, rel.name, rel.target
                        ))
                    })?;
                let derived = derive_relation(model, rel, target, &by_name, &self.models)?;
                resolved[model_idx].relations[rel_idx] = derived;
            }
        }

        tracing::debug!(models = resolved.len(), "schema registry built");
        Ok(SchemaRegistry {
            models: resolved.into_iter().map(Arc::new).collect(),
            by_name,
        })
    }
}

fn check_unique_fields(model: &ModelSchema) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    let names = model
        .attributes
        .iter()
        .map(|a| a.name.as_str())
        .chain(model.relations.iter().map(|r| r.name.as_str()));
    for name in names {
        if name == naming::ID {
            return Err(Error::schema(format!(
                "{} declares reserved field {name}",
                model.type_name
            )));
        }
        if !seen.insert(name) {
            return Err(Error::schema(format!(
                "{} declares field {name} twice",
                model.type_name
            )));
        }
    }
    Ok(())
}

fn derive_relation(
    model: &ModelSchema,
    rel: &RelationInfo,
    target: &ModelSchema,
    by_name: &HashMap<String, usize>,
    models: &[ModelSchema],
) -> Result<RelationInfo> {
    let mut out = rel.clone();
    let path = format!("{}.{}", model.type_name, rel.name);

    if let Some(through) = &rel.through {
        let via = model.relation_named(&through.via).ok_or_else(|| {
            Error::schema(format!("{path} goes through unknown field {}", through.via))
        })?;
        let via_target = by_name
            .get(&via.target)
            .and_then(|idx| models.get(*idx))
            .ok_or_else(|| Error::schema(format!("{path}: unknown type {}", via.target)))?;
        let end = via_target
            .relation_named(&through.target_field)
            .ok_or_else(|| {
                Error::schema(format!(
                    "{path}: {} has no relation {}",
                    via_target.type_name, through.target_field
                ))
            })?;
        if end.target != rel.target {
            return Err(Error::schema(format!(
                "{path} resolves to {} but declares {}",
                end.target, rel.target
            )));
        }
        out.has_key = false;
        return Ok(out);
    }

    let opposite = match &rel.opposite {
        Some(name) => {
            let opposite = target.relation_named(name).ok_or_else(|| {
                Error::schema(format!(
                    "{path}: opposite {}.{name} does not exist",
                    target.type_name
                ))
            })?;
            if opposite.target != model.type_name {
                return Err(Error::schema(format!(
                    "{path}: opposite {}.{name} targets {}",
                    target.type_name, opposite.target
                )));
            }
            Some(opposite)
        }
        None => None,
    };
    out.opposite_column = opposite.map(|o| o.column.clone());

    match rel.kind {
        RelationKind::HasOne => {
            out.one_to_one = opposite.is_some_and(RelationInfo::is_has_one);
            if out.one_to_one {
                let other_has_key = opposite.is_some_and(|o| o.has_key);
                if rel.has_key == other_has_key {
                    return Err(Error::schema(format!(
                        "{path}: exactly one side of a one-to-one relation must hold the key"
                    )));
                }
            } else {
                out.has_key = true;
            }
        }
        RelationKind::HasMany => {
            out.has_key = false;
            out.many_to_one = opposite.is_some_and(RelationInfo::is_has_one);
            out.many_to_many = !out.many_to_one;
            if out.many_to_many {
                let member_column = opposite.map_or(naming::ID, |o| o.column.as_str());
                if model.type_name == target.type_name && rel.column == member_column {
                    return Err(Error::schema(format!(
                        "{path}: a self-referencing many-to-many relation needs distinct fields"
                    )));
                }
                out.join = Some(JoinTable::derive(
                    &model.table,
                    &rel.column,
                    &target.table,
                    member_column,
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> SchemaRegistryBuilder {
        SchemaRegistry::builder()
            .model(
                ModelSchema::new("Account")
                    .attr("name", SqlType::Text)
                    .relation(RelationInfo::has_one("category", "Category").opposite("account"))
                    .relation(
                        RelationInfo::has_many("transactions", "Transaction").opposite("account"),
                    )
                    .relation(RelationInfo::has_many("tags", "Tag").opposite("accounts"))
                    .timestamps(),
            )
            .model(
                ModelSchema::new("Category")
                    .attr("name", SqlType::Text)
                    .relation(
                        RelationInfo::has_one("account", "Account")
                            .opposite("category")
                            .key(),
                    ),
            )
            .model(
                ModelSchema::new("Transaction")
                    .attr("amount", SqlType::Double)
                    .relation(RelationInfo::has_one("account", "Account").opposite("transactions")),
            )
            .model(
                ModelSchema::new("Tag")
                    .attr("name", SqlType::Text)
                    .relation(RelationInfo::has_many("accounts", "Account").opposite("tags")),
            )
    }

    #[test]
    fn test_derives_relation_flags() {
        let registry = accounts().build().unwrap();
        let account = registry.schema("Account").unwrap();

        let category = account.relation_named("category").unwrap();
        assert!(category.one_to_one);
        assert!(!category.has_key);

        let other = registry.schema("Category").unwrap();
        let back = other.relation_named("account").unwrap();
        assert!(back.one_to_one && back.has_key);
        assert_eq!(back.column, "account");

        let txs = account.relation_named("transactions").unwrap();
        assert!(txs.many_to_one && !txs.many_to_many);
        assert_eq!(txs.opposite_column.as_deref(), Some("account"));

        let owner = registry.schema("Transaction").unwrap();
        let fk = owner.relation_named("account").unwrap();
        assert!(!fk.one_to_one && fk.has_key);

        let tags = account.relation_named("tags").unwrap();
        assert!(tags.many_to_many);
        let join = tags.join.as_ref().unwrap();
        assert_eq!(join.table, "accounts__tags___tags__accounts");
        assert_eq!(join.owner_column, "accounts__tags");
        assert_eq!(join.member_column, "tags__accounts");
    }

    #[test]
    fn test_timestamps_add_attributes() {
        let registry = accounts().build().unwrap();
        let account = registry.schema("Account").unwrap();
        assert!(account.has_timestamps());
        assert!(account.attribute_named("created_at").is_some());
        assert!(account.attribute_named("updated_at").is_some());
        assert_eq!(account.field_count(), 3 + 3);
    }

    #[test]
    fn test_one_to_one_needs_single_key_owner() {
        let err = SchemaRegistry::builder()
            .model(ModelSchema::new("A").relation(RelationInfo::has_one("b", "B").opposite("a")))
            .model(ModelSchema::new("B").relation(RelationInfo::has_one("a", "A").opposite("b")))
            .build()
            .unwrap_err();
        assert!(err.is_schema());

        let err = SchemaRegistry::builder()
            .model(
                ModelSchema::new("A").relation(RelationInfo::has_one("b", "B").opposite("a").key()),
            )
            .model(
                ModelSchema::new("B").relation(RelationInfo::has_one("a", "A").opposite("b").key()),
            )
            .build()
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_unknown_target_and_opposite() {
        let err = SchemaRegistry::builder()
            .model(ModelSchema::new("A").relation(RelationInfo::has_one("b", "Missing")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown model type Missing"));

        let err = SchemaRegistry::builder()
            .model(ModelSchema::new("A").relation(RelationInfo::has_one("b", "B").opposite("nope")))
            .model(ModelSchema::new("B"))
            .build()
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_self_referencing_many_to_many() {
        let registry = SchemaRegistry::builder()
            .model(
                ModelSchema::new("Person")
                    .relation(RelationInfo::has_many("friends", "Person").opposite("friendOf"))
                    .relation(RelationInfo::has_many("friendOf", "Person").opposite("friends")),
            )
            .build()
            .unwrap();
        let person = registry.schema("Person").unwrap();
        let a = person.relation_named("friends").unwrap().join.clone().unwrap();
        let b = person.relation_named("friendOf").unwrap().join.clone().unwrap();
        assert_eq!(a.table, b.table);
        assert_eq!(a, b.flipped());

        let err = SchemaRegistry::builder()
            .model(
                ModelSchema::new("Person")
                    .relation(RelationInfo::has_many("peers", "Person").opposite("peers")),
            )
            .build()
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_through_must_resolve() {
        let registry = accounts()
            .model(
                ModelSchema::new("Ledger")
                    .relation(RelationInfo::has_one("account", "Account"))
                    .relation(RelationInfo::has_many("tags", "Tag").through("account", "tags")),
            )
            .build()
            .unwrap();
        let ledger = registry.schema("Ledger").unwrap();
        let tags = ledger.relation_named("tags").unwrap();
        assert!(tags.is_through());
        assert!(tags.join.is_none());
        assert!(!tags.stores_column());

        let err = accounts()
            .model(
                ModelSchema::new("Ledger")
                    .relation(RelationInfo::has_one("account", "Account"))
                    .relation(RelationInfo::has_many("tags", "Category").through("account", "tags")),
            )
            .build()
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_duplicate_and_reserved_fields() {
        let err = SchemaRegistry::builder()
            .model(ModelSchema::new("A").attr("x", SqlType::Text).attr("x", SqlType::Text))
            .build()
            .unwrap_err();
        assert!(err.is_schema());

        let err = SchemaRegistry::builder()
            .model(ModelSchema::new("A").attr("id", SqlType::BigInt))
            .build()
            .unwrap_err();
        assert!(err.is_schema());

        let err = SchemaRegistry::builder()
            .model(ModelSchema::new("A"))
            .model(ModelSchema::new("A"))
            .build()
            .unwrap_err();
        assert!(err.is_schema());
    }
}
