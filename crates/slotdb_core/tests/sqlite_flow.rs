//! Driver flows against SQLite files.

use std::path::Path;
use std::sync::Arc;

use slotdb_codec::Value;
use slotdb_core::{CacheEvent, Config, CoreError, Driver, ListCondition};
use slotdb_storage::{SqliteStore, Store};

async fn open(path: &Path, config: Config) -> Driver {
    let store = SqliteStore::open(path).await.unwrap();
    Driver::open(
        Arc::new(store) as Arc<dyn Store>,
        config.usage_flush_interval(None),
    )
    .await
    .unwrap()
}

fn attrs(pairs: &[(&str, Value)]) -> Value {
    Value::map(pairs.iter().map(|(k, v)| (*k, v.clone())))
}

#[tokio::test]
async fn full_flow_on_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let driver = open(&dir.path().join("flow.db"), Config::default().value_base_length(32)).await;

    for age in [3, 1, 2] {
        driver
            .create(
                "User",
                &attrs(&[
                    ("id", Value::from(format!("u{age}"))),
                    ("group", Value::from("g")),
                    ("age", Value::Integer(age)),
                    ("bar", Value::map([("b", Value::Bool(age == 1)), ("n", Value::Integer(age))])),
                ]),
            )
            .await
            .unwrap();
    }

    let sorted = driver
        .list(
            "User",
            &ListCondition::all()
                .filter(attrs(&[("group", Value::from("g"))]))
                .sort(["-age"])
                .page(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(sorted.ids(), vec!["u3", "u2"]);
    assert_eq!((sorted.meta.total, sorted.meta.length), (3, 2));

    let nested = driver
        .list(
            "User",
            &ListCondition::all().filter(attrs(&[("bar", Value::map([("b", Value::Bool(true))]))])),
        )
        .await
        .unwrap();
    assert_eq!(nested.ids(), vec!["u1"]);

    let long = "x".repeat(100);
    driver
        .update("User", "u1", &attrs(&[("bio", Value::from(long.as_str()))]))
        .await
        .unwrap();
    let u1 = driver.one("User", "u1").await.unwrap().unwrap();
    assert_eq!(u1.get("bio"), Some(&Value::from(long.as_str())));
    assert_eq!(u1.get("age"), Some(&Value::Integer(1)));

    driver
        .update("User", "u1", &attrs(&[("bio", Value::from("brief"))]))
        .await
        .unwrap();
    let u1 = driver.one("User", "u1").await.unwrap().unwrap();
    assert_eq!(u1.get("bio"), Some(&Value::from("brief")));

    assert_eq!(driver.destroy("User", "u2").await.unwrap(), 1);
    let rest = driver.list("User", &ListCondition::all()).await.unwrap();
    assert_eq!(rest.ids(), vec!["u3", "u1"]);

    driver.close().await.unwrap();
}

#[tokio::test]
async fn two_drivers_share_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let first = open(&path, Config::default()).await;
    let second = open(&path, Config::default()).await;
    let mut events = first.subscribe();

    first
        .create("Post", &attrs(&[("id", Value::from("p")), ("title", Value::from("a"))]))
        .await
        .unwrap();
    assert_eq!(events.recv().await.unwrap(), CacheEvent::invalidate("Post", "p"));

    let seen = second.one("Post", "p").await.unwrap().unwrap();
    assert_eq!(seen.get("title"), Some(&Value::from("a")));

    let err = second
        .create("Post", &attrs(&[("id", Value::from("p"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::EntityExists { .. }));

    first.drop("Post").await.unwrap();
    assert!(second.resources().await.unwrap().is_empty());
    second
        .create("Post", &attrs(&[("id", Value::from("q")), ("title", Value::from("b"))]))
        .await
        .unwrap();
    let listed = first.list("Post", &ListCondition::all()).await.unwrap();
    assert_eq!(listed.ids(), vec!["q"]);

    first.close().await.unwrap();
    second.close().await.unwrap();
}

#[tokio::test]
async fn too_many_columns_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let driver = open(&dir.path().join("narrow.db"), Config::default().column_count(2)).await;
    driver
        .create("N", &attrs(&[("id", Value::from("n")), ("a", Value::Integer(1))]))
        .await
        .unwrap();
    let err = driver
        .update(
            "N",
            "n",
            &attrs(&[("b", Value::Integer(2)), ("c", Value::Integer(3))]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TooManyColumns { limit: 2, .. }));
    let n = driver.one("N", "n").await.unwrap().unwrap();
    assert_eq!(n.attributes.len(), 1);
    driver.close().await.unwrap();
}
