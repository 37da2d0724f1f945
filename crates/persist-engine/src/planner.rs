//! Creation ordering for graphs of new models.
//!
//! [`CreationPlan`] lists every new model reachable from a root through
//! `hasOne` fields and non-embedded many-to-one collections. Inserting the
//! list back to front creates key targets before the models that reference
//! them wherever the graph allows it; references that still point at a new
//! model at insertion time are patched after the whole plan is inserted.

use std::collections::HashSet;

use persist_core::{Model, ModelKey, Result};

/// Ordered list of new models to insert.
#[derive(Debug, Default)]
pub struct CreationPlan {
    models: Vec<Model>,
    listed: HashSet<ModelKey>,
}

impl CreationPlan {
    /// Plan the creation of `root` and everything new it reaches.
    pub fn for_root(root: &Model) -> Result<Self> {
        let mut plan = Self::default();
        plan.add_models_to_create(0, root)?;
        tracing::debug!(root = %root, models = plan.len(), "creation planned");
        Ok(plan)
    }

    /// Insert `model` at `pos` and walk its relations.
    ///
    /// A model already listed is skipped, so every instance appears once no
    /// matter how many paths reach it.
    pub fn add_models_to_create(&mut self, pos: usize, model: &Model) -> Result<()> {
        if !self.listed.insert(model.key()) {
            return Ok(());
        }
        let pos = pos.min(self.models.len());
        self.models.insert(pos, model.clone());

        let schema = model.schema();
        for rel in schema.relations().iter().filter(|r| r.is_has_one() && !r.is_through()) {
            if !model.is_set(&rel.name) {
                continue;
            }
            let Some(one) = model.one(&rel.name) else {
                continue;
            };
            if !one.is_new() || self.contains(&one) {
                continue;
            }
            if rel.one_to_one && !rel.has_key {
                // the other side holds the key: create it after `model`
                self.add_models_to_create(pos, &one)?;
            } else {
                self.add_models_to_create(self.models.len(), &one)?;
            }
        }

        for rel in schema
            .relations()
            .iter()
            .filter(|r| r.many_to_one && !r.embedded && !r.is_through())
        {
            for child in model.many(&rel.name) {
                if !child.is_new() || self.contains(&child) {
                    continue;
                }
                if let Some(back) = &rel.opposite {
                    if !child.is_set(back) {
                        child.set(back, model)?;
                    }
                }
                self.add_models_to_create(0, &child)?;
            }
        }
        Ok(())
    }

    /// Whether `model` is already listed.
    pub fn contains(&self, model: &Model) -> bool {
        self.listed.contains(&model.key())
    }

    /// Listed models, in list order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Models in the order they must be inserted (the list reversed).
    pub fn insertion_order(&self) -> impl Iterator<Item = &Model> {
        self.models.iter().rev()
    }

    /// Number of listed models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True if nothing is listed.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// List position of `model`, if listed.
    pub fn position(&self, model: &Model) -> Option<usize> {
        self.models.iter().position(|m| m.same(model))
    }
}
