//! Secondary index reads.

use parking_lot::Mutex;
use quarry_codec::Value;
use quarry_core::{CoreError, CursorOptions, Direction, KeyRange, Mode};
use quarry_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn isbns(books: &[Value]) -> Vec<Value> {
    books
        .iter()
        .map(|book| book.get("isbn").cloned().unwrap_or_default())
        .collect()
}

#[test]
fn test_unique_index_get() {
    let library = TestLibrary::new();
    let (found, missing) = library
        .run(|db| async move {
            seed_books(&db).await?;
            let by_title = db.store("books")?.index("byTitle")?;
            assert!(by_title.unique());
            assert_eq!(by_title.key_path(), "title");
            Ok::<_, CoreError>((
                by_title.get("Bedrock Nights").await?,
                by_title.get("Slate Stories").await?,
            ))
        })
        .unwrap();
    assert_eq!(found, Some(sample_books()[2].clone()));
    assert_eq!(missing, None);
}

#[test]
fn test_non_unique_index() {
    let library = TestLibrary::new();
    let (first, matches) = library
        .run(|db| async move {
            seed_books(&db).await?;
            let by_author = db.store("books")?.index("byAuthor")?;
            Ok::<_, CoreError>((
                by_author.get("Fred").await?,
                by_author.get_matches("Fred").await?,
            ))
        })
        .unwrap();
    // lowest primary key first
    assert_eq!(first, Some(sample_books()[0].clone()));
    assert_eq!(isbns(&matches), vec![Value::from(1), Value::from(2)]);
}

#[test]
fn test_index_count() {
    let library = TestLibrary::new();
    let (all, of_2012, of_2013_on) = library
        .run(|db| async move {
            seed_books(&db).await?;
            let by_year = db.store("books")?.index("byYear")?;
            Ok::<_, CoreError>((
                by_year.count(None).await?,
                by_year.count(Some(KeyRange::only(2012)?)).await?,
                by_year.count(Some(KeyRange::lower_bound(2013, false)?)).await?,
            ))
        })
        .unwrap();
    assert_eq!((all, of_2012, of_2013_on), (3, 2, 1));
}

#[test]
fn test_get_all_orders_by_index_key_then_primary_key() {
    let library = TestLibrary::new();
    let books = library
        .run(|db| async move {
            seed_books(&db).await?;
            let range = KeyRange::bound(2012, 2013, false, false)?;
            db.store("books")?.index("byYear")?.get_all(Some(range)).await
        })
        .unwrap();
    assert_eq!(isbns(&books), vec![Value::from(1), Value::from(3), Value::from(2)]);
}

#[test]
fn test_multi_entry_index() {
    let library = TestLibrary::new();
    let (stone, entries, empty) = library
        .run(|db| async move {
            seed_magazines(&db).await?;
            let by_words = db.store("magazines")?.index("byWords")?;
            assert!(by_words.multi_entry());
            Ok::<_, CoreError>((
                by_words.get_matches("stone").await?,
                by_words.count(None).await?,
                by_words.get_matches("slate").await?,
            ))
        })
        .unwrap();
    let ids: Vec<_> = stone.iter().map(|m| m.get("id").cloned()).collect();
    assert_eq!(ids, vec![Some(Value::from(1)), Some(Value::from(2))]);
    // one entry per word: 2 + 2 + 1 + 0
    assert_eq!(entries, 5);
    assert!(empty.is_empty());
}

#[test]
fn test_unique_index_rejects_duplicates() {
    let library = TestLibrary::new();
    let result = library.run(|db| async move {
        seed_books(&db).await?;
        db.store("books")?
            .put(record(json!({ "isbn": 9, "title": "Water Buffaloes", "author": "Dino" })))
            .await
    });
    assert!(matches!(result, Err(CoreError::Constraint { .. })));
}

#[test]
fn test_index_cursor_unique_direction() {
    let library = TestLibrary::new();
    let visited = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&visited);
    library
        .run(|db| async move {
            seed_books(&db).await?;
            db.store("books")?
                .index("byAuthor")?
                .cursor(
                    CursorOptions::new().direction(Direction::NextUnique),
                    move |cursor| {
                        sink.lock()
                            .push((cursor.key().clone(), cursor.primary_key().clone()));
                        cursor.advance().unwrap();
                    },
                )
                .await
        })
        .unwrap();
    assert_eq!(
        *visited.lock(),
        vec![
            (Value::from("Barney"), Value::from(3)),
            (Value::from("Fred"), Value::from(1)),
        ]
    );
}

#[test]
fn test_index_in_an_explicit_transaction() {
    let library = TestLibrary::new();
    let (by_year, by_title, outcome) = library
        .run(|db| async move {
            seed_books(&db).await?;
            let txn = db.transaction(["books"], Mode::ReadOnly);
            let books = txn.store("books")?;
            let by_year = books.index("byYear")?;
            let by_title = books.index("byTitle")?;
            let (a, b) = futures_util::join!(
                by_year.get_matches(2013),
                by_title.get("Quarry Memories")
            );
            Ok::<_, CoreError>((a?, b?, txn.await))
        })
        .unwrap();
    assert_eq!(isbns(&by_year), vec![Value::from(2)]);
    assert_eq!(by_title, Some(sample_books()[0].clone()));
    assert_eq!(outcome, Ok(()));
}

#[test]
fn test_year_range_cursor() {
    let library = TestLibrary::new();
    let visited = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&visited);
    let of_2012 = library
        .run(|db| async move {
            seed_books(&db).await?;
            let by_year = db.store("books")?.index("byYear")?;
            let range = KeyRange::bound(2012, 2012, false, false)?;
            by_year
                .cursor(CursorOptions::new().range(range.clone()), move |cursor| {
                    sink.lock().push(cursor.primary_key().clone());
                    cursor.advance().unwrap();
                })
                .await?;
            by_year.get_all(Some(range)).await
        })
        .unwrap();
    assert_eq!(*visited.lock(), vec![Value::from(1), Value::from(3)]);
    assert_eq!(of_2012.len(), 2);
    assert!(of_2012
        .iter()
        .all(|book| book.get("year") == Some(&Value::from(2012))));
}
