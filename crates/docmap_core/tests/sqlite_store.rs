mod common;

use common::{doc, Author, Book, Goose};
use docmap_core::{
    open_db, ConflictPolicy, Connection, Key, Mappable, Model, ScopeStack,
};
use serde_json::json;
use tempfile::TempDir;

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("docmap.sqlite3")
}

#[test]
fn saved_models_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let mut scope = ScopeStack::new();

    let key = scope
        .with_connection(open_db(&path).unwrap(), |scope| {
            let mut author = Author {
                id: None,
                name: "Ann".to_string(),
                tags: vec!["poet".to_string()],
            };
            author.save(scope)?;
            let author_key = author.id.clone().unwrap();

            let mut book = Book {
                id: Some(Key::from("b1")),
                title: "Dunes".to_string(),
                author: Some(Author::get(scope, author_key.clone())?),
            };
            book.save(scope)?;
            Ok(author_key)
        })
        .unwrap();

    let mut guard = scope.enter(open_db(&path).unwrap());
    let book = Book::get(&mut guard, "b1").unwrap();
    let author = book.borrow().author.clone().unwrap();
    assert_eq!(author.borrow().id, Some(key.clone()));
    assert_eq!(author.borrow().tags, vec!["poet".to_string()]);
    assert_eq!(
        book.borrow().describe().to_string(),
        format!("<Book: id=\"b1\", title=\"Dunes\", author=<Author {key}>>")
    );
}

#[test]
fn upsert_merges_into_stored_document() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db(db_path(&dir)).unwrap();
    conn.insert(
        "authors",
        doc(json!({ "id": "a1", "name": "Ann", "legacy": 42 })),
        ConflictPolicy::Error,
    )
    .unwrap();

    let mut scope = ScopeStack::new();
    let mut guard = scope.enter(conn);
    let author = Author::get(&mut guard, "a1").unwrap();
    author.borrow_mut().name = "Annie".to_string();
    let result = author.borrow_mut().save(&mut guard).unwrap();
    assert_eq!(result.replaced, 1);

    let stored = guard
        .connection()
        .unwrap()
        .get("authors", &Key::from("a1"))
        .unwrap()
        .unwrap();
    assert_eq!(stored["name"], json!("Annie"));
    assert_eq!(stored["legacy"], json!(42));
    assert_eq!(stored["tags"], json!([]));

    let unchanged = author.borrow_mut().save(&mut guard).unwrap();
    assert_eq!(unchanged.unchanged, 1);
}

#[test]
fn get_many_reads_one_batch_in_request_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut scope = ScopeStack::new();
    let mut guard = scope.enter(open_db(db_path(&dir)).unwrap());

    for (id, name) in [(1_i64, "one"), (2, "two"), (3, "three")] {
        let mut author = Author::with_defaults();
        author.id = Some(Key::Int(id));
        author.name = name.to_string();
        author.save(&mut guard).unwrap();
    }

    let names: Vec<Option<String>> =
        Author::get_many(&mut guard, [Key::Int(3), Key::Int(9), Key::Int(1)])
            .unwrap()
            .map(|handle| handle.map(|author| author.borrow().name.clone()))
            .collect();

    assert_eq!(
        names,
        vec![Some("three".to_string()), None, Some("one".to_string())]
    );
}

#[test]
fn compound_keys_round_trip_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let mut scope = ScopeStack::new();
    let mut guard = scope.enter(open_db(db_path(&dir)).unwrap());

    let key = Key::Compound(vec![Key::from("pond"), Key::Int(7)]);
    let mut goose = Goose {
        id: Some(key.clone()),
        honks: 12,
    };
    goose.save(&mut guard).unwrap();

    let loaded = Goose::get_compound(&mut guard, [Key::from("pond"), Key::Int(7)]).unwrap();
    assert_eq!(loaded.borrow().honks, 12);
    assert_eq!(loaded.borrow().id, Some(key));

    let other = Key::Compound(vec![Key::from("pond"), Key::Int(8)]);
    let missing = Goose::get_many(&mut guard, [other]).unwrap().next().unwrap();
    assert!(missing.is_none());
}

#[test]
fn scope_exit_closes_sqlite_connection() {
    let dir = tempfile::tempdir().unwrap();
    let mut scope = ScopeStack::new();
    let guard = scope.enter(open_db(db_path(&dir)).unwrap());
    guard.exit().unwrap();

    assert!(!scope.is_active());
    let mut guard = scope.enter(open_db(db_path(&dir)).unwrap());
    let first = Author::get_many(&mut guard, Vec::<Key>::new()).unwrap();
    assert_eq!(first.len(), 0);
}
