//! Runtime model instances.
//!
//! A [`Model`] is a shared, mutable handle to one entity: a sparse bag of
//! field values keyed by its [`ModelSchema`], an optional database id, and a
//! [`FieldsSet`] recording which fields the application assigned. Cloning a
//! `Model` clones the handle, not the entity, so object graphs (including
//! cyclic ones) can be expressed directly.
//!
//! Handles are reference counted; a cycle of models referencing each other is
//! not reclaimed until one of the references is cleared.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::fields_set::FieldsSet;
use crate::schema::{FieldRef, ModelSchema, RelationKind};
use crate::value::Value;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a model instance, independent of its database id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey(u64);

impl ModelKey {
    fn next() -> Self {
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw token value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// The value held by one field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Attribute value.
    Value(Value),
    /// `hasOne` reference; `None` clears it.
    One(Option<Model>),
    /// `hasMany` collection.
    Many(Vec<Model>),
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Value(v)
    }
}

impl From<Model> for FieldValue {
    fn from(m: Model) -> Self {
        FieldValue::One(Some(m))
    }
}

impl From<&Model> for FieldValue {
    fn from(m: &Model) -> Self {
        FieldValue::One(Some(m.clone()))
    }
}

impl From<Option<Model>> for FieldValue {
    fn from(m: Option<Model>) -> Self {
        FieldValue::One(m)
    }
}

impl From<Vec<Model>> for FieldValue {
    fn from(m: Vec<Model>) -> Self {
        FieldValue::Many(m)
    }
}

macro_rules! field_value_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for FieldValue {
            fn from(v: $ty) -> Self {
                FieldValue::Value(Value::from(v))
            }
        })*
    };
}

field_value_from!(bool, i32, i64, f64, &str, String, Vec<u8>, serde_json::Value);

struct ModelData {
    key: ModelKey,
    schema: Arc<ModelSchema>,
    id: Option<i64>,
    values: Vec<Option<FieldValue>>,
    set: FieldsSet,
}

/// Shared handle to a model instance.
#[derive(Clone)]
pub struct Model(Rc<RefCell<ModelData>>);

impl Model {
    /// Create a new, empty instance of `schema`.
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let count = schema.field_count();
        Self(Rc::new(RefCell::new(ModelData {
            key: ModelKey::next(),
            schema,
            id: None,
            values: vec![None; count],
            set: FieldsSet::empty(count),
        })))
    }

    /// An id-only instance standing in for a row that was not loaded.
    pub fn stub(schema: Arc<ModelSchema>, id: i64) -> Self {
        let model = Self::new(schema);
        model.set_id(id);
        model
    }

    /// Identity token of this instance.
    pub fn key(&self) -> ModelKey {
        self.0.borrow().key
    }

    /// Whether both handles refer to the same instance.
    pub fn same(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Schema of this instance.
    pub fn schema(&self) -> Arc<ModelSchema> {
        Arc::clone(&self.0.borrow().schema)
    }

    /// Model type name.
    pub fn type_name(&self) -> String {
        self.0.borrow().schema.type_name().to_string()
    }

    /// Database id, if assigned.
    pub fn id(&self) -> Option<i64> {
        self.0.borrow().id
    }

    /// Assign the database id.
    pub fn set_id(&self, id: i64) {
        self.0.borrow_mut().id = Some(id);
    }

    /// Positive id, if the model has been persisted.
    pub fn persisted_id(&self) -> Option<i64> {
        self.id().filter(|id| *id >= 1)
    }

    /// True until the model carries a positive id.
    pub fn is_new(&self) -> bool {
        self.persisted_id().is_none()
    }

    /// Assign a field and mark it set.
    ///
    /// # Errors
    ///
    /// [`Error::Schema`] if the field does not exist or the value does not
    /// fit its kind.
    pub fn set(&self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.store(field, value.into(), true)
    }

    /// Store a field value without marking it set.
    ///
    /// # Errors
    ///
    /// Same as [`Model::set`].
    pub fn put(&self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.store(field, value.into(), false)
    }

    fn store(&self, field: &str, value: FieldValue, mark: bool) -> Result<()> {
        let mut data = self.0.borrow_mut();
        let field_ref = data.schema.field(field).ok_or_else(|| {
            Error::schema(format!("{} has no field named {field}", data.schema.type_name()))
        })?;
        let fits = match (field_ref, &value) {
            (FieldRef::Attribute(_), FieldValue::Value(_)) => true,
            (FieldRef::Relation(idx), FieldValue::One(_)) => {
                data.schema.relations()[idx].kind == RelationKind::HasOne
            }
            (FieldRef::Relation(idx), FieldValue::Many(_)) => {
                data.schema.relations()[idx].kind == RelationKind::HasMany
            }
            _ => false,
        };
        if !fits {
            return Err(Error::schema(format!(
                "value does not fit {}.{field}",
                data.schema.type_name()
            )));
        }
        let slot = data.schema.slot(field_ref);
        data.values[slot] = Some(value);
        if mark {
            data.set.set(slot);
        }
        Ok(())
    }

    /// Whether the field was explicitly set.
    pub fn is_set(&self, field: &str) -> bool {
        let data = self.0.borrow();
        data.schema
            .field(field)
            .is_some_and(|f| data.set.is_set(data.schema.slot(f)))
    }

    /// True if no field is set.
    pub fn nothing_set(&self) -> bool {
        self.0.borrow().set.none_set()
    }

    /// Current value of a field, if one is stored.
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        let data = self.0.borrow();
        let slot = data.schema.slot(data.schema.field(field)?);
        data.values[slot].clone()
    }

    /// Attribute value; `None` when absent or not an attribute.
    pub fn value(&self, field: &str) -> Option<Value> {
        match self.get(field)? {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Referenced model of a `hasOne` field.
    pub fn one(&self, field: &str) -> Option<Model> {
        match self.get(field)? {
            FieldValue::One(m) => m,
            _ => None,
        }
    }

    /// Members of a `hasMany` field (empty when absent).
    pub fn many(&self, field: &str) -> Vec<Model> {
        match self.get(field) {
            Some(FieldValue::Many(v)) => v,
            _ => Vec::new(),
        }
    }

    /// `Type:id` description used in errors and logs.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        match data.id {
            Some(id) => write!(f, "{}:{id}", data.schema.type_name()),
            None => write!(f, "{}:null", data.schema.type_name()),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Model")
            .field("type", &data.schema.type_name())
            .field("id", &data.id)
            .field("key", &data.key.0)
            .finish_non_exhaustive()
    }
}
