//! Integration tests for the brobbot-store crate.
//!
//! These tests drive the public `Brain` API against a real SQLite database
//! on disk (via tempfile): persistence across reopen, both value codecs,
//! sequencing of concurrent writers, and the degraded and closed states.

use brobbot_store::{
    Brain, BrainConfig, Database, FailurePolicy, KeyType, Placement, StoreError, User,
};
use serde_json::{Map, json};

fn on_disk(dir: &tempfile::TempDir, use_msgpack: bool) -> BrainConfig {
    BrainConfig {
        db_name: dir.path().join("brain.db").display().to_string(),
        use_msgpack,
        ..BrainConfig::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = on_disk(&dir, true);

    {
        let brain = Brain::open(&config).await.unwrap();
        brain.scalars().set("greeting", json!("hello")).await.unwrap();
        brain.lists().push_right("queue", json!(1)).await.unwrap();
        brain.lists().push_right("queue", json!(2)).await.unwrap();
        brain.sets().add("tags", json!("rust")).await.unwrap();
        brain.hashes().set("prefs", "color", json!("blue")).await.unwrap();
        brain.users().upsert(&User::new("u1")).await.unwrap();
        brain.close().await.unwrap();
    }

    let brain = Brain::open(&config).await.unwrap();
    assert_eq!(
        brain.scalars().get("greeting").await.unwrap(),
        Some(json!("hello"))
    );
    assert_eq!(
        brain.lists().all("queue").await.unwrap(),
        Some(vec![json!(1), json!(2)])
    );
    assert!(brain.sets().is_member("tags", json!("rust")).await.unwrap());
    assert_eq!(
        brain.hashes().get("prefs", "color").await.unwrap(),
        Some(json!("blue"))
    );
    assert_eq!(brain.users().get("u1").await.unwrap(), Some(User::new("u1")));
    assert_eq!(
        brain.types(&["greeting", "queue", "tags", "prefs"]).await.unwrap(),
        vec![
            Some(KeyType::Object),
            Some(KeyType::List),
            Some(KeyType::Set),
            Some(KeyType::Hash),
        ]
    );
}

#[tokio::test]
async fn json_codec_round_trips_structures() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, false)).await.unwrap();

    let doc = json!({"nested": {"list": [1, "two", null], "flag": true}});
    brain.scalars().set("doc", doc.clone()).await.unwrap();
    assert_eq!(brain.scalars().get("doc").await.unwrap(), Some(doc));

    brain.scalars().set("arr", json!([1, 2, 3])).await.unwrap();
    assert_eq!(brain.type_of("arr").await.unwrap(), Some(KeyType::List));
    assert_eq!(brain.lists().length("arr").await.unwrap(), Some(3));
}

#[tokio::test]
async fn unopenable_path_degrades_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    let config = BrainConfig {
        db_name: dir.path().join("missing").join("brain.db").display().to_string(),
        ..BrainConfig::default()
    };

    let brain = Brain::open(&config).await.unwrap();
    assert!(matches!(
        brain.keys("").await,
        Err(StoreError::Unavailable(_))
    ));
    assert!(matches!(
        brain.scalars().increment("hits", 1).await,
        Err(StoreError::Unavailable(_))
    ));
}

#[tokio::test]
async fn close_rejects_later_calls() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    let other = brain.clone();
    brain.close().await.unwrap();

    assert!(matches!(other.exists("k").await, Err(StoreError::Closed)));
    assert!(matches!(
        other.sets().add("s", json!(1)).await,
        Err(StoreError::Closed)
    ));
}

#[tokio::test]
async fn cells_written_as_text_or_numbers_read_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = on_disk(&dir, true);
    let db = Database::open(dir.path().join("brain.db")).unwrap();
    let brain = Brain::with_database(db.clone(), &config).await.unwrap();
    db.execute(|conn| {
        conn.execute_batch(
            "INSERT INTO brobbot (key, value) VALUES ('data:n', 7), ('data:t', '[1,2]'), ('data:s', 'hello')",
        )?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(brain.scalars().get("n").await.unwrap(), Some(json!(7)));
    assert_eq!(brain.scalars().get("t").await.unwrap(), Some(json!([1, 2])));
    assert_eq!(brain.type_of("t").await.unwrap(), Some(KeyType::List));
    assert_eq!(brain.scalars().get("s").await.unwrap(), Some(json!("hello")));
    assert_eq!(brain.scalars().increment("n", 1).await.unwrap(), 8);
    assert_eq!(brain.lists().push_right("t", json!(3)).await.unwrap(), 3);
}

#[tokio::test]
async fn oversized_set_at_leaves_the_brain_usable() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    brain.lists().push_right("l", json!(1)).await.unwrap();

    assert!(matches!(
        brain.lists().set_at("l", i64::MAX, json!(2)).await,
        Err(StoreError::InvalidArgument(_))
    ));
    assert_eq!(brain.scalars().get("other").await.unwrap(), None);
    assert_eq!(brain.lists().push_right("l", json!(3)).await.unwrap(), 2);
}

// ═══════════════════════════════════════════════════════════════════════
//  Sequencing
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn concurrent_increments_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();

    let results = futures::future::join_all([
        brain.scalars().increment("n", 3),
        brain.scalars().increment("n", 4),
    ])
    .await;
    for result in &results {
        assert!(result.is_ok());
    }
    assert_eq!(brain.scalars().get("n").await.unwrap(), Some(json!(7)));
}

#[tokio::test]
async fn concurrent_pushes_from_tasks_keep_every_element() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let brain = brain.clone();
        handles.push(tokio::spawn(async move {
            brain.lists().push_right("jobs", json!(i)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut jobs: Vec<i64> = brain
        .lists()
        .all("jobs")
        .await
        .unwrap()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    jobs.sort_unstable();
    assert_eq!(jobs, (0..20).collect::<Vec<_>>());

    let stats = brain.sequencer_stats();
    assert_eq!(stats.begun(), 20);
    assert_eq!(stats.committed(), 20);
}

#[tokio::test]
async fn pushes_submitted_in_order_apply_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    let lists = brain.lists();

    futures::future::join_all((0..10).map(|i| lists.push_right("ordered", json!(i)))).await;
    assert_eq!(
        lists.all("ordered").await.unwrap().unwrap(),
        (0..10).map(|i| json!(i)).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn failed_unit_commits_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    brain.scalars().set("word", json!("abc")).await.unwrap();

    assert!(matches!(
        brain.scalars().increment("word", 1).await,
        Err(StoreError::NotAnInteger { .. })
    ));
    assert_eq!(brain.sequencer_stats().failed(), 1);
    assert_eq!(brain.sequencer_stats().rolled_back(), 0);
    assert_eq!(brain.scalars().get("word").await.unwrap(), Some(json!("abc")));
}

#[tokio::test]
async fn rollback_policy_is_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let config = BrainConfig {
        failure_policy: FailurePolicy::Rollback,
        ..on_disk(&dir, true)
    };
    let brain = Brain::open(&config).await.unwrap();
    brain.lists().push_right("l", json!(1)).await.unwrap();

    assert!(matches!(
        brain.lists().set_at("l", -5, json!(0)).await,
        Err(StoreError::InvalidArgument(_))
    ));
    assert_eq!(brain.sequencer_stats().rolled_back(), 1);
    assert_eq!(brain.lists().all("l").await.unwrap(), Some(vec![json!(1)]));
}

// ═══════════════════════════════════════════════════════════════════════
//  Structures
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn list_operations_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    let lists = brain.lists();

    assert_eq!(lists.push_right("l", json!("b")).await.unwrap(), 1);
    assert_eq!(lists.push_left("l", json!("a")).await.unwrap(), 2);
    assert_eq!(
        lists
            .insert("l", Placement::After, json!("b"), json!("c"))
            .await
            .unwrap(),
        Some(3)
    );
    assert_eq!(
        lists
            .insert("l", Placement::Before, json!("zz"), json!("x"))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        lists.range("l", 0, -1).await.unwrap(),
        Some(vec![json!("a"), json!("b"), json!("c")])
    );
    assert_eq!(lists.index("l", -1).await.unwrap(), Some(json!("c")));

    lists.set_at("l", 1, json!("B")).await.unwrap();
    lists.push_right("l", json!("a")).await.unwrap();
    assert_eq!(lists.remove_all("l", json!("a")).await.unwrap(), 2);
    assert_eq!(lists.pop_left("l").await.unwrap(), Some(json!("B")));
    assert_eq!(lists.pop_right("l").await.unwrap(), Some(json!("c")));
    assert_eq!(lists.pop_right("l").await.unwrap(), None);
    assert_eq!(lists.length("l").await.unwrap(), Some(0));
    assert_eq!(lists.length("never").await.unwrap(), None);
}

#[tokio::test]
async fn list_operations_on_a_scalar_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    brain.scalars().set("obj", json!({"a": 1})).await.unwrap();

    assert!(matches!(
        brain.lists().push_right("obj", json!(1)).await,
        Err(StoreError::WrongType { .. })
    ));
    assert_eq!(
        brain.scalars().get("obj").await.unwrap(),
        Some(json!({"a": 1}))
    );
}

#[tokio::test]
async fn hashes_and_keys() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    let hashes = brain.hashes();

    assert!(hashes.set("profile", "name", json!("al")).await.unwrap());
    assert!(hashes.set("profile", "age", json!(30)).await.unwrap());
    assert!(!hashes.set("profile", "age", json!(31)).await.unwrap());
    assert_eq!(hashes.size("profile").await.unwrap(), Some(2));
    assert_eq!(hashes.fields("profile").await.unwrap(), ["name", "age"]);
    assert_eq!(hashes.increment_field("profile", "age", 1).await.unwrap(), 32);

    brain.scalars().set("plain", json!(1)).await.unwrap();
    assert_eq!(brain.keys("").await.unwrap(), ["plain", "profile"]);
    assert_eq!(brain.keys("pro").await.unwrap(), ["profile"]);
    assert_eq!(brain.keys("%").await.unwrap(), Vec::<String>::new());

    assert!(brain.remove("profile").await.unwrap());
    assert_eq!(brain.type_of("profile").await.unwrap(), None);
}

#[tokio::test]
async fn set_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, false)).await.unwrap();
    let sets = brain.sets();

    assert!(sets.add("s", json!(1)).await.unwrap());
    assert!(!sets.add("s", json!(1)).await.unwrap());
    assert!(sets.add("s", json!({"k": "v"})).await.unwrap());
    assert_eq!(sets.size("s").await.unwrap(), Some(2));
    assert!(sets.is_member("s", json!({"k": "v"})).await.unwrap());

    let pick = sets.random_member("s").await.unwrap().unwrap();
    assert!(pick == json!(1) || pick == json!({"k": "v"}));
    assert!(sets.remove("s", json!(1)).await.unwrap());
    assert_eq!(brain.type_of("s").await.unwrap(), Some(KeyType::Set));
}

// ═══════════════════════════════════════════════════════════════════════
//  Users
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn user_lookup_by_id_and_name() {
    let dir = tempfile::tempdir().unwrap();
    let brain = Brain::open(&on_disk(&dir, true)).await.unwrap();
    let users = brain.users();

    let mut options = Map::new();
    options.insert("name".into(), json!("Alice"));
    options.insert("room".into(), json!("general"));
    let alice = users.by_id("1", &options).await.unwrap();
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.room.as_deref(), Some("general"));

    let mut al = Map::new();
    al.insert("name".into(), json!("Al"));
    users.by_id("2", &al).await.unwrap();

    assert_eq!(users.by_id("1", &Map::new()).await.unwrap(), alice);
    assert_eq!(
        users.by_exact_name("alice").await.unwrap().map(|u| u.id),
        Some("1".to_string())
    );
    assert_eq!(users.by_fuzzy_name("al").await.unwrap().len(), 2);
    assert_eq!(
        users
            .by_fuzzy_name("Al")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect::<Vec<_>>(),
        ["2"]
    );

    // Users live outside the data namespace.
    assert!(brain.keys("").await.unwrap().is_empty());
    brain.reset().await.unwrap();
    assert!(users.all().await.unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
//  Shared database
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn two_tables_in_one_file_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("shared.db")).unwrap();
    let base = on_disk(&dir, true);
    let first = Brain::with_database(db.clone(), &base).await.unwrap();
    let second = Brain::with_database(
        db,
        &BrainConfig {
            table_name: "other_brain".into(),
            ..base
        },
    )
    .await
    .unwrap();

    first.scalars().set("k", json!(1)).await.unwrap();
    assert_eq!(second.scalars().get("k").await.unwrap(), None);
    second.reset().await.unwrap();
    assert_eq!(first.scalars().get("k").await.unwrap(), Some(json!(1)));
}
