//! Database open, close and delete.

use futures_util::join;
use quarry_core::{
    open, CoreError, Database, DatabaseStatus, IndexOptions, Mode, Schema, StoreOptions,
};
use quarry_engine::{EngineError, MemoryEngine};
use quarry_testkit::prelude::*;

#[test]
fn test_metadata() {
    let library = TestLibrary::new();
    assert_eq!(library.name(), LIBRARY);
    assert_eq!(library.version(), 3);
    assert_eq!(library.store_names(), vec!["books", "magazines", "storage"]);
    assert_eq!(library.status(), DatabaseStatus::Unopened);
}

#[test]
fn test_open_is_shared() {
    let library = TestLibrary::new();
    let (books, magazines) = library
        .run(|db| async move {
            let books = db.store("books")?;
            let magazines = db.store("magazines")?;
            let (a, b) = join!(books.count(None), magazines.count(None));
            Ok::<_, CoreError>((a?, b?))
        })
        .unwrap();
    assert_eq!((books, magazines), (0, 0));
    assert_eq!(library.status(), DatabaseStatus::Open);
    let stats = library.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.upgrades, 1);
    assert_eq!(library.engine.database_version(LIBRARY), Some(3));
}

#[test]
fn test_upgrade_from_an_older_version() {
    let engine = MemoryEngine::new();
    let v1 = Schema::new()
        .version(1)
        .add_store("books", StoreOptions::new().key_path("isbn"))
        .add_index("byTitle", "title", IndexOptions::new().unique(true));
    let old = open(LIBRARY, v1, engine.clone()).unwrap();
    let db = old.clone();
    engine
        .run_until(async move { seed_books(&db).await })
        .unwrap()
        .unwrap();
    old.close();

    let current = open(LIBRARY, library_schema(), engine.clone()).unwrap();
    let db = current.clone();
    let (count, by_year) = engine
        .run_until(async move {
            let books = db.store("books")?;
            let count = books.count(None).await?;
            let by_year = books.index("byYear")?.count(None).await?;
            Ok::<_, CoreError>((count, by_year))
        })
        .unwrap()
        .unwrap();
    // the new index covers the records written before the upgrade
    assert_eq!((count, by_year), (3, 3));
    assert_eq!(engine.database_version(LIBRARY), Some(3));
    assert_eq!(engine.stats().upgrades, 2);
}

#[test]
fn test_failed_open_is_sticky() {
    let library = TestLibrary::new();
    library.run(|db| async move { db.get_instance().await.map(|_| ()) }).unwrap();

    let old = library
        .connect(Schema::new().version(1).add_store("books", StoreOptions::new()))
        .unwrap();
    let db = old.clone();
    let (first, second) = library.run(|_| async move {
        let first = db.store("books").unwrap().count(None).await;
        let second = db.get_instance().await.map(|_| ());
        (first, second)
    });
    let expected = CoreError::Open {
        name: LIBRARY.to_string(),
        source: EngineError::Version {
            requested: 1,
            stored: 3,
        },
    };
    assert_eq!(first, Err(expected.clone()));
    assert_eq!(second, Err(expected));
    assert_eq!(old.status(), DatabaseStatus::Failed);
    assert_eq!(library.stats().opens, 1);
}

#[test]
fn test_upgrade_blocked_by_an_open_connection() {
    let library = TestLibrary::new();
    library.run(|db| async move { seed_books(&db).await }).unwrap();

    let newer = library
        .connect(library_schema().version(4).add_store("notes", StoreOptions::new()))
        .unwrap();
    let db = newer.clone();
    let result = library.run(|_| async move { db.store("notes")?.count(None).await });
    assert!(matches!(
        result,
        Err(CoreError::Open {
            source: EngineError::Blocked { .. },
            ..
        })
    ));

    library.close();
    let retry = library
        .connect(library_schema().version(4).add_store("notes", StoreOptions::new()))
        .unwrap();
    let result = library.run(|_| async move { retry.store("notes")?.count(None).await });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_closed_database_refuses_work() {
    let library = TestLibrary::new();
    library.run(|db| async move { seed_books(&db).await }).unwrap();
    library.close();
    assert_eq!(library.status(), DatabaseStatus::Closed);

    let result = library.run(|db| async move { db.store("books")?.count(None).await });
    assert_eq!(result, Err(CoreError::Closed));

    let txn = library.transaction(["books"], Mode::ReadOnly);
    let handle = txn.clone();
    let outcome = library.run(|_| async move { handle.await });
    assert_eq!(outcome, Err(CoreError::Closed));
}

#[test]
fn test_close_before_open() {
    let library = TestLibrary::new();
    library.close();
    let result = library.run(|db| async move { db.get_instance().await.map(|_| ()) });
    assert_eq!(result, Err(CoreError::Closed));
    assert_eq!(library.stats().opens, 0);
}

#[test]
fn test_delete_database() {
    let library = TestLibrary::new();
    library.run(|db| async move { seed_books(&db).await }).unwrap();
    library.run(|db| async move { db.del().await }).unwrap();
    assert_eq!(library.engine.database_version(LIBRARY), None);

    let fresh = library.connect(library_schema()).unwrap();
    let count = library
        .run(|_| async move { fresh.store("books")?.count(None).await })
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_delete_blocked_by_another_connection() {
    let library = TestLibrary::new();
    let other = library.connect(library_schema()).unwrap();
    let db = other.clone();
    library
        .run(|_| async move { seed_books(&db).await })
        .unwrap();

    let result = library.run(|db| async move { db.del().await });
    assert!(matches!(result, Err(CoreError::Engine(EngineError::Blocked { .. }))));
    assert_eq!(library.engine.database_version(LIBRARY), Some(3));
}

#[test]
fn test_invalid_schema() {
    let engine = MemoryEngine::new();
    let result = Database::new("empty", Schema::new(), engine.clone());
    assert!(matches!(result, Err(CoreError::Schema { .. })));

    let result = open(
        "backwards",
        Schema::new().version(2).version(1),
        engine.clone(),
    );
    assert!(matches!(result, Err(CoreError::Schema { .. })));

    let result = open(
        "orphan",
        Schema::new().version(1).add_index("byName", "name", IndexOptions::new()),
        engine,
    );
    assert!(matches!(result, Err(CoreError::Schema { .. })));
}

#[test]
fn test_default_mode_from_config() {
    let library = TestLibrary::with(
        quarry_engine::MemoryConfig::default(),
        quarry_core::Config::new().default_mode(Mode::ReadWrite),
    );
    let txn = library.transaction(["books", "books"], None::<Mode>);
    assert_eq!(txn.mode(), Mode::ReadWrite);
    assert_eq!(txn.scope().to_vec(), vec!["books"]);
}
