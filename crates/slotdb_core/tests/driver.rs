//! Integration tests for the driver over an in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use slotdb_codec::Value;
use slotdb_core::{
    CacheEvent, Config, CoreError, Driver, ListCondition, Meta, UnknownFieldPolicy,
};
use slotdb_storage::{KindTables, LockTable, MemoryStore, Store};

async fn open(store: &Arc<MemoryStore>, config: Config) -> Driver {
    Driver::open(
        Arc::clone(store) as Arc<dyn Store>,
        config.usage_flush_interval(None),
    )
    .await
    .unwrap()
}

async fn driver() -> (Arc<MemoryStore>, Driver) {
    let store = Arc::new(MemoryStore::new());
    let driver = open(&store, Config::default()).await;
    (store, driver)
}

fn attrs(pairs: &[(&str, Value)]) -> Value {
    Value::map(pairs.iter().map(|(k, v)| (*k, v.clone())))
}

fn ages(collection: &slotdb_core::Collection) -> Vec<i64> {
    collection
        .entities
        .iter()
        .filter_map(|e| e.get("age").and_then(Value::as_integer))
        .collect()
}

#[tokio::test]
async fn create_then_one() {
    let (_store, driver) = driver().await;
    let created = driver
        .create(
            "User",
            &attrs(&[("id", Value::from("u1")), ("name", Value::from("hoge"))]),
        )
        .await
        .unwrap();
    assert_eq!(created.id, "u1");
    assert_eq!(created.kind, "User");

    let found = driver.one("User", "u1").await.unwrap().unwrap();
    assert_eq!(found.get("name"), Some(&Value::from("hoge")));
    assert_eq!(found.get("id"), None);
    let json = found.to_json();
    assert_eq!(json["id"], "u1");
    assert_eq!(json["$$as"], "User");
    assert!(json["$$num"].is_i64());

    assert!(driver.one("User", "nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn generated_ids_and_duplicates() {
    let (_store, driver) = driver().await;
    let a = driver.create("Item", &attrs(&[])).await.unwrap();
    let b = driver.create("Item", &attrs(&[])).await.unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(a.id.len(), 32);

    let err = driver
        .create("Item", &attrs(&[("id", Value::from(a.id.as_str()))]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::EntityExists { .. }));
}

#[tokio::test]
async fn columns_are_stable_under_concurrency() {
    let store = Arc::new(MemoryStore::new());
    let first = Arc::new(open(&store, Config::default()).await);
    let second = Arc::new(open(&store, Config::default()).await);

    let mut tasks = Vec::new();
    for i in 0..12 {
        let driver = Arc::clone(if i % 2 == 0 { &first } else { &second });
        tasks.push(tokio::spawn(async move {
            let name = format!("f{}", i % 4);
            driver
                .create("Doc", &attrs(&[(name.as_str(), Value::Integer(i)), ("shared", Value::Bool(true))]))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let all = first
        .list("Doc", &ListCondition::all().page(1, 100))
        .await
        .unwrap();
    assert_eq!(all.meta.total, 12);
    for entity in &all.entities {
        assert_eq!(entity.get("shared"), Some(&Value::Bool(true)));
    }
    let seen_by_second = second
        .list("Doc", &ListCondition::all().filter(attrs(&[("f3", Value::Integer(3))])))
        .await
        .unwrap();
    assert_eq!(seen_by_second.len(), 1);
}

#[tokio::test]
async fn overflow_roundtrip_and_shrink() {
    let store = Arc::new(MemoryStore::new());
    let driver = open(&store, Config::default().value_base_length(16)).await;
    let long = "長い文字列".repeat(5);

    driver
        .create("Note", &attrs(&[("id", Value::from("n")), ("body", Value::from(long.as_str()))]))
        .await
        .unwrap();
    let note = driver.one("Note", "n").await.unwrap().unwrap();
    assert_eq!(note.get("body"), Some(&Value::from(long.as_str())));

    let listed = driver.list("Note", &ListCondition::all()).await.unwrap();
    assert_eq!(listed.entities[0].get("body"), Some(&Value::from(long.as_str())));

    driver
        .update("Note", "n", &attrs(&[("body", Value::from("short"))]))
        .await
        .unwrap();
    let note = driver.one("Note", "n").await.unwrap().unwrap();
    assert_eq!(note.get("body"), Some(&Value::from("short")));
}

#[tokio::test]
async fn overflow_starts_past_the_base_length() {
    let store = Arc::new(MemoryStore::new());
    let driver = open(&store, Config::default().value_base_length(16)).await;
    let tables = KindTables::new("Note", driver.config().column_count);

    let cases = [
        ("fits", "a".repeat(16), 0),
        ("fits_wide", "é".repeat(8), 0),
        ("straddles", format!("a{}", "é".repeat(8)), 1),
        ("past", "a".repeat(17), 2),
    ];
    for (id, body, overflows) in &cases {
        driver
            .create(
                "Note",
                &attrs(&[("id", Value::from(*id)), ("body", Value::from(body.as_str()))]),
            )
            .await
            .unwrap();
        assert_eq!(store.overflow_count(&tables), *overflows, "after {id}");
    }
    for (id, body, _) in &cases {
        let note = driver.one("Note", id).await.unwrap().unwrap();
        assert_eq!(note.get("body"), Some(&Value::from(body.as_str())), "{id}");
    }

    // shrinking back to the boundary clears the stored overflow
    driver
        .update("Note", "straddles", &attrs(&[("body", Value::from("é".repeat(8)))]))
        .await
        .unwrap();
    assert_eq!(store.overflow_count(&tables), 1);
    let note = driver.one("Note", "straddles").await.unwrap().unwrap();
    assert_eq!(note.get("body"), Some(&Value::from("é".repeat(8))));
}

#[tokio::test]
async fn bracketed_keys_with_huge_indexes_read_back() {
    let (_store, driver) = driver().await;
    let created = driver
        .create(
            "Odd",
            &attrs(&[
                ("id", Value::from("o")),
                ("a[4000000000]", Value::Integer(1)),
                ("b[18446744073709551615]", Value::Integer(2)),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(created.get("a[4000000000]"), Some(&Value::Integer(1)));
    assert_eq!(created.get("b[18446744073709551615]"), Some(&Value::Integer(2)));

    let listed = driver.list("Odd", &ListCondition::all()).await.unwrap();
    assert_eq!(listed.entities[0].attributes.len(), 2);
}

async fn ids_matching(driver: &Driver, filter: &str) -> Vec<String> {
    let filter = Value::from_json(serde_json::from_str(filter).unwrap());
    let found = driver
        .list("Num", &ListCondition::all().filter(filter))
        .await
        .unwrap();
    found.ids().into_iter().map(str::to_string).collect()
}

#[tokio::test]
async fn integral_floats_compare_as_integers() {
    let (_store, driver) = driver().await;
    let numbers = [
        ("four", Value::Float(4.0)),
        ("half", Value::Float(4.5)),
        ("five", Value::Integer(5)),
    ];
    for (id, n) in numbers {
        driver
            .create("Num", &attrs(&[("id", Value::from(id)), ("n", n)]))
            .await
            .unwrap();
    }
    assert_eq!(ids_matching(&driver, r#"{"n": 4}"#).await, vec!["four"]);
    assert_eq!(ids_matching(&driver, r#"{"n": {"$lte": 4}}"#).await, vec!["four"]);
    assert_eq!(ids_matching(&driver, r#"{"n": {"$between": [1, 4]}}"#).await, vec!["four"]);
    assert_eq!(ids_matching(&driver, r#"{"n": {"$gt": 4}}"#).await, vec!["half", "five"]);

    let four = driver.one("Num", "four").await.unwrap().unwrap();
    assert_eq!(four.get("n"), Some(&Value::Integer(4)));
}

#[tokio::test]
async fn update_is_visible_immediately() {
    let (_store, driver) = driver().await;
    driver
        .create("User", &attrs(&[("id", Value::from("u")), ("name", Value::from("a"))]))
        .await
        .unwrap();
    // warm the cache
    driver.one("User", "u").await.unwrap();

    let updated = driver
        .update(
            "User",
            "u",
            &attrs(&[("name", Value::from("b")), ("fresh", Value::Integer(7))]),
        )
        .await
        .unwrap();
    assert_eq!(updated.get("fresh"), Some(&Value::Integer(7)));

    let again = driver.one("User", "u").await.unwrap().unwrap();
    assert_eq!(again.get("name"), Some(&Value::from("b")));
    assert_eq!(again.get("fresh"), Some(&Value::Integer(7)));

    let err = driver
        .update("User", "ghost", &attrs(&[("name", Value::from("x"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::EntityNotFound { ref id, .. } if id == "ghost"));
}

#[tokio::test]
async fn update_replaces_nested_values() {
    let (_store, driver) = driver().await;
    driver
        .create(
            "Post",
            &attrs(&[
                ("id", Value::from("p")),
                ("tags", Value::Array(vec![Value::from("a"), Value::from("b"), Value::from("c")])),
            ]),
        )
        .await
        .unwrap();
    driver
        .update("Post", "p", &attrs(&[("tags", Value::Array(vec![Value::from("z")]))]))
        .await
        .unwrap();
    let post = driver.one("Post", "p").await.unwrap().unwrap();
    assert_eq!(post.get("tags"), Some(&Value::Array(vec![Value::from("z")])));
}

#[tokio::test]
async fn filter_and_sort_by_age() {
    let (_store, driver) = driver().await;
    for age in [2, 3, 1] {
        driver
            .create("User", &attrs(&[("group", Value::from("g")), ("age", Value::Integer(age))]))
            .await
            .unwrap();
    }
    driver
        .create("User", &attrs(&[("group", Value::from("other")), ("age", Value::Integer(9))]))
        .await
        .unwrap();

    let by_group = ListCondition::all().filter(attrs(&[("group", Value::from("g"))]));
    let ascending = driver
        .list("User", &by_group.clone().sort(["age"]))
        .await
        .unwrap();
    assert_eq!(ages(&ascending), vec![1, 2, 3]);
    let descending = driver
        .list("User", &by_group.sort(["-age"]))
        .await
        .unwrap();
    assert_eq!(ages(&descending), vec![3, 2, 1]);

    let older = driver
        .list(
            "User",
            &ListCondition::all()
                .filter(attrs(&[("age", Value::map([("$gte", Value::Integer(2))]))]))
                .sort(["age"]),
        )
        .await
        .unwrap();
    assert_eq!(ages(&older), vec![2, 3, 9]);

    let counts = driver.usage("User").await.unwrap();
    assert_eq!(counts.where_cols.get("group"), Some(&2));
    assert_eq!(counts.order_cols.get("age"), Some(&3));
    assert_eq!(counts.filter.get("age"), Some(&1));
}

#[tokio::test]
async fn pagination_meta() {
    let (_store, driver) = driver().await;
    for age in 1..=3 {
        driver
            .create("User", &attrs(&[("age", Value::Integer(age))]))
            .await
            .unwrap();
    }
    let first = driver
        .list("User", &ListCondition::all().page(1, 2))
        .await
        .unwrap();
    assert_eq!(
        first.meta,
        Meta {
            offset: 0,
            limit: 2,
            total: 3,
            length: 2
        }
    );
    let second = driver
        .list("User", &ListCondition::all().page(2, 2))
        .await
        .unwrap();
    assert_eq!(second.meta.offset, 2);
    assert_eq!(second.meta.length, 1);
    assert_eq!(ages(&second), vec![3]);

    let bad = driver
        .list("User", &ListCondition::all().page(0, 2))
        .await
        .unwrap_err();
    assert!(matches!(bad, CoreError::InvalidArgument { .. }));
}

#[tokio::test]
async fn nested_attributes_keep_their_types() {
    let (_store, driver) = driver().await;
    let bar = Value::map([
        ("b", Value::Bool(false)),
        ("n", Value::Integer(1)),
        ("s", Value::from("hoge")),
    ]);
    let created = driver
        .create("Foo", &attrs(&[("bar", bar.clone())]))
        .await
        .unwrap();
    driver
        .create(
            "Foo",
            &attrs(&[("bar", Value::map([("n", Value::Integer(2))]))]),
        )
        .await
        .unwrap();

    let found = driver.one("Foo", &created.id).await.unwrap().unwrap();
    assert_eq!(found.get("bar"), Some(&bar));

    let matched = driver
        .list(
            "Foo",
            &ListCondition::all().filter(attrs(&[("bar", Value::map([("n", Value::Integer(1))]))])),
        )
        .await
        .unwrap();
    assert_eq!(matched.ids(), vec![created.id.as_str()]);
}

#[tokio::test]
async fn drop_only_touches_one_kind() {
    let (_store, driver) = driver().await;
    driver
        .create("A", &attrs(&[("id", Value::from("a1")), ("x", Value::Integer(1))]))
        .await
        .unwrap();
    driver
        .create("B", &attrs(&[("id", Value::from("b1")), ("y", Value::Integer(2)), ("x", Value::Integer(3))]))
        .await
        .unwrap();
    let mut events = driver.subscribe();

    driver.drop("A").await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        CacheEvent::invalidate_bulk("A", vec!["a1".to_string()])
    );

    let names: Vec<String> = driver
        .resources()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["B".to_string()]);
    let b = driver.one("B", "b1").await.unwrap().unwrap();
    assert_eq!(b.get("x"), Some(&Value::Integer(3)));

    // the kind comes back empty, with a fresh column map
    assert!(driver.one("A", "a1").await.unwrap().is_none());
    let again = driver
        .create("A", &attrs(&[("id", Value::from("a2")), ("z", Value::Integer(5))]))
        .await
        .unwrap();
    assert_eq!(again.get("z"), Some(&Value::Integer(5)));
    let old_name = driver
        .list("A", &ListCondition::all().filter(attrs(&[("x", Value::Integer(1))])))
        .await
        .unwrap();
    assert!(old_name.is_empty());

    driver.drop("Nothing").await.unwrap();
}

#[tokio::test]
async fn drop_by_a_peer_is_survived() {
    let store = Arc::new(MemoryStore::new());
    let first = open(&store, Config::default()).await;
    let second = open(&store, Config::default()).await;
    first
        .create("K", &attrs(&[("id", Value::from("k1")), ("v", Value::Integer(1))]))
        .await
        .unwrap();
    assert!(second.one("K", "k1").await.unwrap().is_some());

    first.drop("K").await.unwrap();
    second
        .create("K", &attrs(&[("id", Value::from("k2")), ("v", Value::Integer(2))]))
        .await
        .unwrap();
    let listed = first.list("K", &ListCondition::all()).await.unwrap();
    assert_eq!(listed.ids(), vec!["k2"]);
}

#[tokio::test]
async fn too_many_columns_keeps_existing_ones() {
    let store = Arc::new(MemoryStore::new());
    let driver = open(&store, Config::default().column_count(3)).await;
    driver
        .create("T", &attrs(&[("id", Value::from("t")), ("a", Value::Integer(1)), ("b", Value::Integer(2))]))
        .await
        .unwrap();

    let err = driver
        .create("T", &attrs(&[("c", Value::Integer(1)), ("d", Value::Integer(2))]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TooManyColumns { limit: 3, .. }));

    let t = driver.one("T", "t").await.unwrap().unwrap();
    assert_eq!(t.get("a"), Some(&Value::Integer(1)));
    assert_eq!(t.get("b"), Some(&Value::Integer(2)));
    driver
        .update("T", "t", &attrs(&[("c", Value::Integer(3))]))
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_filter_names_follow_the_policy() {
    let store = Arc::new(MemoryStore::new());
    let strict = open(&store, Config::default()).await;
    let lax = open(&store, Config::default().unknown_fields(UnknownFieldPolicy::Ignore)).await;
    strict
        .create("U", &attrs(&[("age", Value::Integer(1))]))
        .await
        .unwrap();

    let filter = ListCondition::all().filter(attrs(&[("ghost", Value::Integer(1))]));
    assert!(strict.list("U", &filter).await.unwrap().is_empty());
    assert_eq!(lax.list("U", &filter).await.unwrap().len(), 1);
}

#[tokio::test]
async fn peer_sees_columns_assigned_elsewhere() {
    let store = Arc::new(MemoryStore::new());
    let first = open(&store, Config::default()).await;
    let second = open(&store, Config::default()).await;
    first
        .create("P", &attrs(&[("id", Value::from("p")), ("a", Value::Integer(1))]))
        .await
        .unwrap();
    // second snapshots the map before the new name exists
    assert!(second.one("P", "p").await.unwrap().is_some());

    first
        .update("P", "p", &attrs(&[("late", Value::from("x"))]))
        .await
        .unwrap();
    let listed = second
        .list("P", &ListCondition::all().filter(attrs(&[("late", Value::from("x"))])))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed.entities[0].get("late"), Some(&Value::from("x")));
}

#[tokio::test]
async fn events_are_published_and_applied() {
    let store = Arc::new(MemoryStore::new());
    let first = open(&store, Config::default()).await;
    let second = open(&store, Config::default()).await;
    let mut events = first.subscribe();

    first
        .create("E", &attrs(&[("id", Value::from("e")), ("v", Value::Integer(1))]))
        .await
        .unwrap();
    assert_eq!(events.recv().await.unwrap(), CacheEvent::invalidate("E", "e"));
    // second caches the old row
    let cached = second.one("E", "e").await.unwrap().unwrap();
    assert_eq!(cached.get("v"), Some(&Value::Integer(1)));

    first
        .update("E", "e", &attrs(&[("v", Value::Integer(2))]))
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(
        second.one("E", "e").await.unwrap().unwrap().get("v"),
        Some(&Value::Integer(1))
    );
    second.handle_event(&event);
    assert_eq!(
        second.one("E", "e").await.unwrap().unwrap().get("v"),
        Some(&Value::Integer(2))
    );

    assert_eq!(first.destroy("E", "e").await.unwrap(), 1);
    assert_eq!(events.recv().await.unwrap(), CacheEvent::invalidate("E", "e"));
    assert_eq!(first.destroy("E", "e").await.unwrap(), 0);
}

#[tokio::test]
async fn serialized_updates_all_land() {
    let store = Arc::new(MemoryStore::new());
    let driver = Arc::new(open(&store, Config::default().serialize_updates(true)).await);
    driver
        .create("C", &attrs(&[("id", Value::from("c"))]))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let driver = Arc::clone(&driver);
        tasks.push(tokio::spawn(async move {
            let name = format!("k{i}");
            driver
                .update("C", "c", &attrs(&[(name.as_str(), Value::Integer(i))]))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    let c = driver.one("C", "c").await.unwrap().unwrap();
    let keys: BTreeMap<&str, &Value> = c.attributes.iter().map(|(k, v)| (k.as_str(), v)).collect();
    assert_eq!(keys.len(), 8);
}

#[tokio::test]
async fn resources_split_domains() {
    let (_store, driver) = driver().await;
    driver.create("User@example.com", &attrs(&[])).await.unwrap();
    driver.create("Plain", &attrs(&[])).await.unwrap();
    let mut names: Vec<(String, Option<String>)> = driver
        .resources()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.name, r.domain))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            ("Plain".to_string(), None),
            ("User".to_string(), Some("example.com".to_string())),
        ]
    );
}

#[tokio::test]
async fn unlock_all_releases_stale_locks() {
    let (store, driver) = driver().await;
    assert!(store.try_lock("schema/slot_k_x").await.unwrap());
    assert_eq!(driver.unlock_all().await.unwrap(), 1);
    assert!(!store.is_locked("schema/slot_k_x").await.unwrap());
}
