//! Store operations through implicit and explicit transactions.

use quarry_codec::Value;
use quarry_core::{CoreError, KeyRange, Mode};
use quarry_engine::EngineError;
use quarry_testkit::prelude::*;
use serde_json::json;

#[test]
fn test_put_and_get() {
    let library = TestLibrary::new();
    let (key, book, missing) = library
        .run(|db| async move {
            let books = db.store("books")?;
            let key = books.put(extra_book()).await?;
            let book = books.get(4).await?;
            let missing = books.get(99).await?;
            Ok::<_, CoreError>((key, book, missing))
        })
        .unwrap();
    assert_eq!(key, Value::from(4));
    assert_eq!(book, Some(extra_book()));
    assert_eq!(missing, None);
    // one transaction per call
    assert_eq!(library.stats().transactions_created, 3);
    assert_eq!(library.stats().live_transactions(), 0);
}

#[test]
fn test_put_at_writes_the_key_path() {
    let library = TestLibrary::new();
    let book = library
        .run(|db| async move {
            let books = db.store("books")?;
            books
                .put_at(7, record(json!({ "title": "Untitled", "author": "Pebbles" })))
                .await?;
            books.get(7).await
        })
        .unwrap();
    assert_eq!(
        book,
        Some(record(json!({ "isbn": 7, "title": "Untitled", "author": "Pebbles" })))
    );
}

#[test]
fn test_put_at_rejects_a_conflicting_key() {
    let library = TestLibrary::new();
    let result = library.run(|db| async move {
        db.store("books")?.put_at(5, extra_book()).await
    });
    assert!(matches!(result, Err(CoreError::Data { .. })));
    // refused before any engine work
    assert_eq!(library.stats().transactions_created, 0);
}

#[test]
fn test_out_of_line_keys() {
    let library = TestLibrary::new();
    let (value, refused) = library
        .run(|db| async move {
            let storage = db.store("storage")?;
            storage.put_at("theme", "dark").await?;
            storage.put_at("theme", "light").await?;
            let refused = storage.put("no key").await;
            Ok::<_, CoreError>((storage.get("theme").await?, refused))
        })
        .unwrap();
    assert_eq!(value, Some(Value::from("light")));
    assert!(matches!(refused, Err(CoreError::Data { .. })));
}

#[test]
fn test_records_with_unordered_fields() {
    let library = TestLibrary::new();
    let unordered = Value::Map(vec![
        ("title".to_string(), Value::from("Pebbles Rising")),
        ("year".to_string(), Value::from(2014)),
        ("isbn".to_string(), Value::from(42)),
    ]);
    let (key, book, by_title, setting) = library
        .run(|db| {
            let unordered = unordered.clone();
            async move {
                let books = db.store("books")?;
                let key = books.put(unordered).await?;
                let book = books.get(42).await?;
                let by_title = books.index("byTitle")?.get("Pebbles Rising").await?;

                let storage = db.store("storage")?;
                let setting = Value::Map(vec![
                    ("zeta".to_string(), Value::from(1)),
                    ("alpha".to_string(), Value::from(2)),
                ]);
                storage.put_at("layout", setting).await?;
                Ok::<_, CoreError>((key, book, by_title, storage.get("layout").await?))
            }
        })
        .unwrap();
    assert_eq!(key, Value::from(42));
    let book = book.unwrap();
    assert_eq!(by_title.as_ref(), Some(&book));
    assert_eq!(book, unordered);
    let names: Vec<_> = book.as_map().unwrap().iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["isbn", "title", "year"]);
    assert_eq!(setting, Some(record(json!({ "alpha": 2, "zeta": 1 }))));
}

#[test]
fn test_auto_increment_keys() {
    let library = TestLibrary::new();
    let (keys, first) = library
        .run(|db| async move {
            seed_magazines(&db).await?;
            let magazines = db.store("magazines")?;
            let key = magazines
                .put(record(json!({ "title": "Shale Times", "publisher": "Bob" })))
                .await?;
            let first = magazines.get(1).await?;
            Ok::<_, CoreError>((key, first))
        })
        .unwrap();
    assert_eq!(keys, Value::from(5));
    let first = first.unwrap();
    assert_eq!(first.get("id"), Some(&Value::from(1)));
    assert_eq!(first.get("title"), Some(&Value::from("Quarry Weekly")));
}

#[test]
fn test_add_rejects_existing_keys() {
    let library = TestLibrary::new();
    let (result, book) = library
        .run(|db| async move {
            seed_books(&db).await?;
            let books = db.store("books")?;
            let mut copy = extra_book();
            copy.insert("isbn", Value::from(1));
            let result = books.add(copy).await;
            Ok::<_, CoreError>((result, books.get(1).await?))
        })
        .unwrap();
    assert!(matches!(result, Err(CoreError::Constraint { .. })));
    assert_eq!(book, Some(sample_books()[0].clone()));
}

#[test]
fn test_get_many_keeps_key_order() {
    let library = TestLibrary::new();
    let found = library
        .run(|db| async move {
            seed_books(&db).await?;
            db.store("books")?.get_many([3, 99, 1]).await
        })
        .unwrap();
    let books = sample_books();
    assert_eq!(found, vec![Some(books[2].clone()), None, Some(books[0].clone())]);
}

#[test]
fn test_get_many_without_keys() {
    let library = TestLibrary::new();
    let found = library
        .run(|db| async move { db.store("books")?.get_many(Vec::<i64>::new()).await })
        .unwrap();
    assert!(found.is_empty());
    assert_eq!(library.stats().opens, 0);
}

#[test]
fn test_delete_operations() {
    let library = TestLibrary::new();
    let (after_del, after_del_many, after_clear) = library
        .run(|db| async move {
            seed_books(&db).await?;
            let books = db.store("books")?;
            books.del(1).await?;
            // deleting a missing key succeeds
            books.del(42).await?;
            let after_del = books.count(None).await?;
            books.del_many([2, 3]).await?;
            let after_del_many = books.count(None).await?;
            seed_books(&db).await?;
            books.clear().await?;
            Ok::<_, CoreError>((after_del, after_del_many, books.count(None).await?))
        })
        .unwrap();
    assert_eq!((after_del, after_del_many, after_clear), (2, 0, 0));
}

#[test]
fn test_count_and_get_all_with_ranges() {
    let library = TestLibrary::new();
    let (total, tail, head) = library
        .run(|db| async move {
            seed_books(&db).await?;
            let books = db.store("books")?;
            let total = books.count(None).await?;
            let tail = books.count(Some(KeyRange::lower_bound(2, false)?)).await?;
            let head = books.get_all(Some(KeyRange::upper_bound(2, true)?)).await?;
            Ok::<_, CoreError>((total, tail, head))
        })
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(tail, 2);
    assert_eq!(head, vec![sample_books()[0].clone()]);
}

#[test]
fn test_write_in_a_readonly_transaction() {
    let library = TestLibrary::new();
    let result = library.run(|db| async move {
        let txn = db.transaction(["storage"], Mode::ReadOnly);
        txn.store("storage")?.put_at("k", "v").await
    });
    assert_eq!(result, Err(CoreError::Engine(EngineError::ReadOnly)));
}

#[test]
fn test_unknown_store_and_index() {
    let library = TestLibrary::new();
    assert_eq!(
        library.store("nope").unwrap_err(),
        CoreError::StoreNotFound {
            name: "nope".to_string()
        }
    );
    let books = library.store("books").unwrap();
    assert_eq!(
        books.index("byPrice").unwrap_err(),
        CoreError::IndexNotFound {
            store: "books".to_string(),
            name: "byPrice".to_string()
        }
    );
}

#[test]
fn test_store_metadata() {
    let library = TestLibrary::new();
    let books = library.store("books").unwrap();
    assert_eq!(books.name(), "books");
    assert_eq!(books.key_path(), Some("isbn"));
    assert!(!books.auto_increment());
    assert_eq!(books.index_names(), vec!["byAuthor", "byTitle", "byYear"]);
    assert!(books.transaction().is_none());

    let magazines = library.store("magazines").unwrap();
    assert!(magazines.auto_increment());

    let txn = library.transaction(["storage"], Mode::ReadWrite);
    let storage = txn.store("storage").unwrap();
    assert_eq!(storage.key_path(), None);
    assert!(storage.transaction().is_some());
}
