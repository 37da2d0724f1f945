//! Fields resolved in a second pass, after every planned model has an id.

use persist_core::{Error, Model, Result};

/// One field write that has to wait for generated ids.
#[derive(Debug, Clone)]
pub enum Deferred {
    /// A key column written as NULL because its target was still new.
    KeyPatch {
        /// Model owning the key column.
        model: Model,
        /// `hasOne` field holding the key.
        field: String,
    },
    /// Replace the join rows of a many-to-many field.
    JoinReplace {
        /// Owning model.
        model: Model,
        /// Many-to-many field.
        field: String,
    },
    /// Point the key-owning side of a one-to-one at this model.
    OneToOneSwap {
        /// Model on the side without the key.
        model: Model,
        /// One-to-one field.
        field: String,
    },
    /// Re-point already persisted children at a newly created owner.
    Link {
        /// Owner.
        model: Model,
        /// Many-to-one field.
        field: String,
        /// Ids of the persisted children.
        children: Vec<i64>,
    },
}

/// Deferred writes collected from a creation plan.
///
/// Items are resolved phase by phase (key patches, join tables, one-to-one
/// swaps, links); within a phase they keep creation-list order.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    patches: Vec<Deferred>,
    creates: Vec<Deferred>,
    updates: Vec<Deferred>,
    links: Vec<Deferred>,
}

impl DeferredQueue {
    /// Collect the deferred fields of `models`, in list order.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] if any model has a `through` field set; nothing
    /// has been written at that point.
    pub fn collect(models: &[Model]) -> Result<Self> {
        let mut queue = Self::default();
        for model in models {
            let schema = model.schema();
            for rel in schema.relations() {
                let set = model.is_set(&rel.name);
                if rel.is_through() {
                    if set {
                        return Err(Error::Unsupported(format!(
                            "creating from a through field is not supported: {}.{}",
                            schema.type_name(),
                            rel.name
                        )));
                    }
                    continue;
                }
                if !set {
                    continue;
                }
                if rel.many_to_many {
                    queue.creates.push(Deferred::JoinReplace {
                        model: model.clone(),
                        field: rel.name.clone(),
                    });
                } else if rel.one_to_one && !rel.has_key {
                    queue.updates.push(Deferred::OneToOneSwap {
                        model: model.clone(),
                        field: rel.name.clone(),
                    });
                } else if rel.many_to_one && !rel.embedded {
                    let children: Vec<i64> = model
                        .many(&rel.name)
                        .iter()
                        .filter_map(Model::persisted_id)
                        .collect();
                    if !children.is_empty() {
                        queue.links.push(Deferred::Link {
                            model: model.clone(),
                            field: rel.name.clone(),
                            children,
                        });
                    }
                }
            }
        }
        Ok(queue)
    }

    /// Queue a key column to be patched once its target exists.
    pub fn push_key_patch(&mut self, model: &Model, field: &str) {
        self.patches.push(Deferred::KeyPatch {
            model: model.clone(),
            field: field.to_string(),
        });
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.patches.len() + self.creates.len() + self.updates.len() + self.links.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items in resolution order.
    pub fn into_items(self) -> impl Iterator<Item = Deferred> {
        self.patches
            .into_iter()
            .chain(self.creates)
            .chain(self.updates)
            .chain(self.links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persist_core::{ModelSchema, RelationInfo, SchemaRegistry, SqlType};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .model(
                ModelSchema::new("Account")
                    .attr("name", SqlType::Text)
                    .relation(RelationInfo::has_one("category", "Category").opposite("account"))
                    .relation(
                        RelationInfo::has_many("transactions", "Transaction").opposite("account"),
                    )
                    .relation(RelationInfo::has_many("tags", "Tag").opposite("accounts"))
                    .relation(RelationInfo::has_many("labels", "Tag").through("category", "tags")),
            )
            .model(
                ModelSchema::new("Category")
                    .relation(
                        RelationInfo::has_one("account", "Account")
                            .opposite("category")
                            .key(),
                    )
                    .relation(RelationInfo::has_many("tags", "Tag")),
            )
            .model(
                ModelSchema::new("Transaction")
                    .relation(RelationInfo::has_one("account", "Account").opposite("transactions")),
            )
            .model(
                ModelSchema::new("Tag")
                    .relation(RelationInfo::has_many("accounts", "Account").opposite("tags")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_collects_phases_in_order() {
        let registry = registry();
        let account = registry.model("Account").unwrap();
        let category = registry.model("Category").unwrap();
        let tag = registry.model("Tag").unwrap();
        let old = registry.model("Transaction").unwrap();
        old.set_id(12);
        let fresh = registry.model("Transaction").unwrap();
        account.set("category", &category).unwrap();
        account.set("tags", vec![tag]).unwrap();
        account.set("transactions", vec![old, fresh]).unwrap();

        let mut queue = DeferredQueue::collect(&[account.clone(), category]).unwrap();
        queue.push_key_patch(&account, "category");
        assert_eq!(queue.len(), 4);

        let items: Vec<_> = queue.into_items().collect();
        assert!(matches!(items[0], Deferred::KeyPatch { .. }));
        assert!(matches!(&items[1], Deferred::JoinReplace { field, .. } if field == "tags"));
        assert!(matches!(&items[2], Deferred::OneToOneSwap { field, .. } if field == "category"));
        assert!(
            matches!(&items[3], Deferred::Link { children, .. } if children.as_slice() == [12])
        );
    }

    #[test]
    fn test_through_fields_are_rejected() {
        let registry = registry();
        let account = registry.model("Account").unwrap();
        account.set("labels", Vec::<Model>::new()).unwrap();
        let err = DeferredQueue::collect(&[account]).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_unset_fields_defer_nothing() {
        let registry = registry();
        let account = registry.model("Account").unwrap();
        account.set("name", "plain").unwrap();
        assert!(DeferredQueue::collect(&[account]).unwrap().is_empty());
    }
}
