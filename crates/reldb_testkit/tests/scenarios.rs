//! End-to-end scenarios over the sample user/address/role model.

use reldb_core::{Config, ConstraintKind, CoreError, Id, Params, TxState, Value};
use reldb_testkit::{sample_database, Address, Role, User};

fn joe() -> User {
    User::new(
        "joe@x.com",
        "123",
        Address::new("NY", "New York", "street A", 101),
        vec![Role::new("admin")],
    )
}

#[test]
fn insert_then_select_by_foreign_key() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();

    let mut user = joe();
    let id = users.store(&mut user).unwrap();
    assert_eq!(id, Id::Int(1));
    assert_eq!(user.id, Some(1));

    let found = users
        .select_by_query("address.state == ?", Params::new().push("NY"))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].email, "joe@x.com");
    assert_eq!(found[0].address.id(), Some(Id::Int(1)));
    assert_eq!(found[0].roles.ids(), vec![Id::Int(1)]);

    // The materialized address came back with the row.
    assert_eq!(found[0].address.entity().unwrap().state, "NY");
}

#[test]
fn unique_violation_leaves_store_unchanged() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    users.store(&mut joe()).unwrap();

    let mut dup = User::new(
        "joe@x.com",
        "456",
        Address::new("CA", "Fresno", "street B", 7),
        vec![],
    );
    let err = users.store(&mut dup).unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    match &err {
        CoreError::FieldInvalid { field, .. } => assert_eq!(field, "email"),
        other => panic!("unexpected {other:?}"),
    }

    // The whole store, including the duplicate's nested address, rolled
    // back.
    assert_eq!(users.len().unwrap(), 1);
    assert_eq!(db.table_len("address"), 1);
}

#[test]
fn delete_with_foreign_key_fails() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    users.store(&mut joe()).unwrap();

    let addresses = db.repository::<Address>();
    let err = addresses
        .delete_by_query("#ID == ?", Params::new().push(Value::Id(Id::Int(1))))
        .unwrap_err();
    match err {
        CoreError::DeleteConstraint { detail } => {
            assert_eq!(detail, "user.#1.address -> #1");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(db.table_len("address"), 1);
}

#[test]
fn cascade_delete_empties_the_reference_closure() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    let mut user = joe();
    users.store(&mut user).unwrap();

    let deleted = users.delete_entity_cascade(&user).unwrap();
    let tables: Vec<&str> = deleted.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(tables, vec!["user", "role", "address"]);

    assert_eq!(db.table_len("user"), 0);
    assert_eq!(db.table_len("role"), 0);
    assert_eq!(db.table_len("address"), 0);
    assert_eq!(db.table_len("user__roles__rel"), 0);
}

#[test]
fn abort_restores_the_pre_transaction_row() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    users.store(&mut joe()).unwrap();

    let result = db.transaction(|tx| {
        let mut user = users
            .select_by_query("email == ?", Params::new().push("joe@x.com"))?
            .remove(0);
        user.email = "smith5@x.com".into();
        users.store(&mut user)?;
        tx.abort("Test")?;
        Ok(())
    });
    result.unwrap();

    let renamed = users
        .select_by_query("email == ?", Params::new().push("smith5@x.com"))
        .unwrap();
    assert!(renamed.is_empty());

    let original = users
        .select_by_query("email == ?", Params::new().push("joe@x.com"))
        .unwrap();
    assert_eq!(original.len(), 1);
    assert_eq!(original[0].password, "123");

    let summary = db.last_transaction().unwrap();
    assert_eq!(summary.state, TxState::Aborted);
    assert_eq!(summary.abort_reason.as_deref(), Some("Test"));
}

#[test]
fn in_list_query_matches_any_of() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();

    for (email, state) in [
        ("joe@x.com", "NY"),
        ("ann@x.com", "CA"),
        ("bob@x.com", "CA"),
    ] {
        let mut user = User::new(
            email,
            "pw",
            Address::new(state, "somewhere", "street", 1),
            vec![],
        );
        users.store(&mut user).unwrap();
    }

    let both = users
        .select_by_query(
            "address.state IN ?",
            Params::new().push(Value::List(vec![
                Value::Text("NY".into()),
                Value::Text("CA".into()),
            ])),
        )
        .unwrap();
    assert_eq!(both.len(), 3);

    let ny_only = users
        .select_by_query(
            "address.state IN ?",
            Params::new().push(Value::List(vec![Value::Text("NY".into())])),
        )
        .unwrap();
    assert_eq!(ny_only.len(), 1);

    // A single non-list parameter matches scalarly through the same
    // operator.
    let scalar = users
        .select_by_query("address.state =~ ?", Params::new().push("NY"))
        .unwrap();
    assert_eq!(scalar.len(), 1);
    assert_eq!(scalar[0].email, "joe@x.com");
}

#[test]
fn committed_foreign_keys_resolve() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    let mut user = joe();
    users.store(&mut user).unwrap();

    // Every non-null FK points at an existing row after commit.
    let addresses = db.repository::<Address>();
    let stored = users.select_all().unwrap();
    for user in &stored {
        let address_id = user.address.id().expect("address stored");
        assert!(addresses.exists_id(address_id).unwrap());
    }
}

#[test]
fn store_from_json_resolves_nested_maps() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();

    let user = users
        .store_from_json(&serde_json::json!({
            "email": "json@x.com",
            "password": "pw",
            "address": { "state": "TX", "city": "Austin", "street": "s", "number": 4 },
            "roles": []
        }))
        .unwrap();
    assert_eq!(user.id, Some(1));
    assert_eq!(user.address.entity().unwrap().state, "TX");

    // Identifier reference instead of a nested map.
    let user2 = users
        .store_from_json(&serde_json::json!({
            "EMAIL": "json2@x.com",
            "password": "pw",
            "address": 1
        }))
        .unwrap();
    assert_eq!(user2.address.id(), Some(Id::Int(1)));
}

#[test]
fn json_round_trip_preserves_fields() {
    use reldb_core::Entity;

    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    let mut user = joe();
    users.store(&mut user).unwrap();

    let loaded = users.select_by_id(1, None).unwrap().unwrap();
    let json = loaded.to_json().unwrap();
    assert_eq!(json["email"], "joe@x.com");
    assert_eq!(json["address"]["state"], "NY");
    assert_eq!(json["roles"][0], 1);
}

#[test]
fn update_diffs_relationship_rows() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    let roles = db.repository::<Role>();

    let mut user = joe();
    users.store(&mut user).unwrap();

    let mut guest = Role::new("guest");
    let guest_id = roles.store(&mut guest).unwrap();

    // Swap roles: admin out, guest in.
    let mut loaded = users.select_by_id(1, None).unwrap().unwrap();
    loaded.roles.remove_at(0);
    loaded.roles.add_id(guest_id.clone());
    users.store(&mut loaded).unwrap();

    assert_eq!(db.table_len("user__roles__rel"), 1);
    let back = users.select_by_id(1, None).unwrap().unwrap();
    assert_eq!(back.roles.ids(), vec![guest_id]);
}

#[test]
fn populate_seeds_tables_on_open() {
    use reldb_value::Record;

    let mut row = Record::new();
    row.set("state", "WA");
    row.set("city", "Seattle");
    row.set("street", "pine");
    row.set("number", 9);
    let config = Config::default().populate("address", vec![row]);

    let db = sample_database(config);
    db.populate().unwrap();
    assert_eq!(db.table_len("address"), 1);

    let addresses = db.repository::<Address>();
    let found = addresses
        .select_by_query("state == ?", Params::new().push("WA"))
        .unwrap();
    assert_eq!(found[0].city, "Seattle");
}

#[test]
fn nested_transaction_is_rejected() {
    let db = sample_database(Config::default());
    let result = db.transaction(|_| db.transaction(|_| Ok(())));
    assert!(matches!(result, Err(CoreError::NestedTransaction)));
}

#[test]
fn execute_error_restores_pre_open_snapshot() {
    let db = sample_database(Config::default());
    let users = db.repository::<User>();
    users.store(&mut joe()).unwrap();

    let result: Result<(), CoreError> = db.transaction(|_| {
        let mut extra = User::new(
            "extra@x.com",
            "pw",
            Address::new("CA", "c", "s", 1),
            vec![],
        );
        users.store(&mut extra)?;
        Err(CoreError::fetch_failed("boom"))
    });
    assert!(result.is_err());

    assert_eq!(users.len().unwrap(), 1);
    assert_eq!(db.table_len("address"), 1);
}
