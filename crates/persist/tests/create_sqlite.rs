mod common;

use common::{int, named, persistor};
use persist::prelude::*;

#[test]
fn sqlite_create_account_with_category_puts_key_on_category() {
    let (p, registry) = persistor();
    let account = named(&registry, "Account", "checking");
    account.set("kind", "personal").expect("set kind");
    let category = named(&registry, "Category", "bills");
    account.set("category", &category).expect("set category");

    let id = p.create(&account).expect("create account");
    assert!(id > 0);
    assert_eq!(account.id(), Some(id));
    let category_id = category.id().expect("category created");
    assert!(category_id > 0);

    assert_eq!(
        int(&p, "SELECT account FROM categories WHERE id = ?1", &[Value::from(category_id)]),
        Some(id)
    );
    let columns = p
        .execute_query_values("SELECT name FROM pragma_table_info('accounts')", &[])
        .expect("table info");
    assert!(!columns.contains(&Value::Text("category".into())));
}

#[test]
fn sqlite_create_mutual_one_to_one_in_one_call() {
    let (p, registry) = persistor();
    let account = named(&registry, "Account", "savings");
    let category = named(&registry, "Category", "rainy day");
    account.set("category", &category).expect("set category");
    category.set("account", &account).expect("set account");

    p.create(&account).expect("create cycle");
    let account_id = account.id().expect("account created");
    assert!(category.id().is_some());

    assert_eq!(
        int(&p, "SELECT COUNT(*) FROM categories WHERE account = ?1", &[Value::from(account_id)]),
        Some(1)
    );
    assert_eq!(int(&p, "SELECT COUNT(*) FROM categories", &[]), Some(1));
    assert_eq!(int(&p, "SELECT COUNT(*) FROM accounts", &[]), Some(1));
}

#[test]
fn sqlite_create_from_key_side_creates_target_first() {
    let (p, registry) = persistor();
    let account = named(&registry, "Account", "brokerage");
    let category = named(&registry, "Category", "investments");
    category.set("account", &account).expect("set account");

    p.create(&category).expect("create category");
    let account_id = account.id().expect("account created first");
    assert_eq!(
        int(&p, "SELECT account FROM categories WHERE id = ?1", &[Value::from(category.id().expect("category id"))]),
        Some(account_id)
    );
}

#[test]
fn sqlite_create_children_point_at_new_owner() {
    let (p, registry) = persistor();
    let account = named(&registry, "Account", "checking");
    let rent = registry.model("Transaction").expect("model");
    rent.set("amount", -950.0).expect("amount");
    let salary = registry.model("Transaction").expect("model");
    salary.set("amount", 3200.0).expect("amount");
    account
        .set("transactions", vec![rent.clone(), salary.clone()])
        .expect("set transactions");

    let id = p.create(&account).expect("create");
    assert!(rent.id().is_some() && salary.id().is_some());
    assert!(rent.one("account").expect("back reference").same(&account));
    assert_eq!(
        int(&p, "SELECT COUNT(*) FROM transactions WHERE account = ?1", &[Value::from(id)]),
        Some(2)
    );
}

#[test]
fn sqlite_create_links_existing_children() {
    let (p, registry) = persistor();
    let orphan = registry.model("Transaction").expect("model");
    orphan.set("amount", 10.0).expect("amount");
    let orphan_id = p.create(&orphan).expect("create orphan");

    let account = named(&registry, "Account", "cash");
    account.set("transactions", vec![orphan]).expect("set transactions");
    let id = p.create(&account).expect("create account");

    assert_eq!(
        int(&p, "SELECT account FROM transactions WHERE id = ?1", &[Value::from(orphan_id)]),
        Some(id)
    );
}

#[test]
fn sqlite_create_writes_join_rows_and_new_members() {
    let (p, registry) = persistor();
    let account = named(&registry, "Account", "joint");
    let home = named(&registry, "Tag", "home");
    let travel = named(&registry, "Tag", "travel");
    account
        .set("tags", vec![home.clone(), travel.clone()])
        .expect("set tags");

    p.create(&account).expect("create");
    assert!(home.id().is_some() && travel.id().is_some());
    assert_eq!(int(&p, "SELECT COUNT(*) FROM tags", &[]), Some(2));

    let tags = p.load_relation(&account, "tags").expect("load tags");
    let FieldValue::Many(tags) = tags else {
        panic!("tags is a collection");
    };
    assert_eq!(tags.len(), 2);
    assert_eq!(p.count("Tag", "", &[]).expect("count"), 2);
}

#[test]
fn sqlite_create_self_referencing_tree() {
    let (p, registry) = persistor();
    let root = named(&registry, "Person", "root");
    let child = named(&registry, "Person", "child");
    let grandchild = named(&registry, "Person", "grandchild");
    child.set("children", vec![grandchild.clone()]).expect("set children");
    root.set("children", vec![child.clone()]).expect("set children");

    p.create(&root).expect("create tree");
    let root_id = root.id().expect("root id");
    let child_id = child.id().expect("child id");
    assert_eq!(
        int(&p, "SELECT parent FROM persons WHERE id = ?1", &[Value::from(child_id)]),
        Some(root_id)
    );
    assert_eq!(
        int(&p, "SELECT parent FROM persons WHERE id = ?1", &[Value::from(grandchild.id().expect("grandchild id"))]),
        Some(child_id)
    );
    assert_eq!(
        int(&p, "SELECT parent FROM persons WHERE id = ?1", &[Value::from(root_id)]),
        None
    );
}

#[test]
fn sqlite_create_stamps_rows() {
    let (p, registry) = persistor();
    let account = named(&registry, "Account", "stamped");
    let id = p.create(&account).expect("create");
    let created = int(&p, "SELECT created_at FROM accounts WHERE id = ?1", &[Value::from(id)]);
    let updated = int(&p, "SELECT updated_at FROM accounts WHERE id = ?1", &[Value::from(id)]);
    assert!(created.is_some_and(|t| t > 0));
    assert_eq!(created, updated);
}

#[test]
fn sqlite_create_errors() {
    let (p, registry) = persistor();
    let account = named(&registry, "Account", "once");
    p.create(&account).expect("create");
    assert!(matches!(p.create(&account), Err(Error::AlreadyPersisted { .. })));

    let tag = registry.model("Tag").expect("model");
    assert!(matches!(p.create(&tag), Err(Error::EmptyModel { .. })));

    let person = named(&registry, "Person", "ancestor");
    person
        .set("grandchildren", Vec::<Model>::new())
        .expect("set through field");
    assert!(matches!(p.create(&person), Err(Error::Unsupported(_))));
    assert_eq!(int(&p, "SELECT COUNT(*) FROM persons", &[]), Some(0));
}
