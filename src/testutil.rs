//! Shared fixtures for unit tests: an in-memory corpus with two
//! versions, one public (KJV) and one private, embedded at dimension 4.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::embedding::vec_to_blob;
use crate::migrate;

pub(crate) const TEST_DIMS: usize = 4;

pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool
}

pub(crate) async fn seed_version(pool: &SqlitePool, code: &str, name: &str) -> i64 {
    sqlx::query("INSERT INTO versions (code, name, updated_at) VALUES (?, ?, ?)")
        .bind(code)
        .bind(name)
        .bind(1_700_000_000_i64)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub(crate) async fn seed_book(
    pool: &SqlitePool,
    version_id: i64,
    number: i64,
    name: &str,
    abbreviation: &str,
) -> i64 {
    sqlx::query("INSERT INTO books (version_id, number, name, abbreviation) VALUES (?, ?, ?, ?)")
        .bind(version_id)
        .bind(number)
        .bind(name)
        .bind(abbreviation)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub(crate) async fn seed_chapter(pool: &SqlitePool, book_id: i64, number: i64) -> i64 {
    sqlx::query("INSERT INTO chapters (book_id, number) VALUES (?, ?)")
        .bind(book_id)
        .bind(number)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

/// Inserts a verse plus its FTS row, mirroring what the import
/// subsystem maintains in production.
pub(crate) async fn seed_verse(
    pool: &SqlitePool,
    chapter_id: i64,
    number: i64,
    text: &str,
    version_code: &str,
) -> i64 {
    let verse_id = sqlx::query("INSERT INTO verses (chapter_id, number, text) VALUES (?, ?, ?)")
        .bind(chapter_id)
        .bind(number)
        .bind(text)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

    sqlx::query("INSERT INTO verses_fts (verse_id, version_code, text) VALUES (?, ?, ?)")
        .bind(verse_id)
        .bind(version_code)
        .bind(text)
        .execute(pool)
        .await
        .unwrap();

    verse_id
}

pub(crate) async fn seed_embedding(pool: &SqlitePool, verse_id: i64, embedding: &[f32]) {
    sqlx::query("INSERT INTO verse_vectors (verse_id, embedding) VALUES (?, ?)")
        .bind(verse_id)
        .bind(vec_to_blob(embedding))
        .execute(pool)
        .await
        .unwrap();
}

pub(crate) async fn version_id(pool: &SqlitePool, code: &str) -> i64 {
    sqlx::query_scalar("SELECT id FROM versions WHERE code = ?")
        .bind(code)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// A corpus with public KJV (two books, four embedded verses) and a
/// private version sharing vocabulary with it.
pub(crate) async fn pool_with_two_versions() -> SqlitePool {
    let pool = memory_pool().await;

    let kjv = seed_version(&pool, "KJV", "King James Version").await;
    let genesis = seed_book(&pool, kjv, 1, "Genesis", "Gen").await;
    let gen1 = seed_chapter(&pool, genesis, 1).await;
    let v1 = seed_verse(
        &pool,
        gen1,
        1,
        "In the beginning God created the heaven and the earth.",
        "KJV",
    )
    .await;
    seed_embedding(&pool, v1, &[1.0, 0.0, 0.0, 0.0]).await;
    let v2 = seed_verse(
        &pool,
        gen1,
        2,
        "And the earth was without form, and void; and darkness was upon the face of the deep.",
        "KJV",
    )
    .await;
    seed_embedding(&pool, v2, &[0.8, 0.6, 0.0, 0.0]).await;
    let v3 = seed_verse(
        &pool,
        gen1,
        3,
        "And God said, Let there be light: and there was light.",
        "KJV",
    )
    .await;
    seed_embedding(&pool, v3, &[0.0, 1.0, 0.0, 0.0]).await;

    let john = seed_book(&pool, kjv, 43, "John", "Jhn").await;
    let john3 = seed_chapter(&pool, john, 3).await;
    let v16 = seed_verse(
        &pool,
        john3,
        16,
        "For God so loved the world, that he gave his only begotten Son.",
        "KJV",
    )
    .await;
    seed_embedding(&pool, v16, &[0.0, 0.0, 1.0, 0.0]).await;

    let private = seed_version(&pool, "PRIVATE_V", "Private Draft Version").await;
    let pbook = seed_book(&pool, private, 1, "Genesis", "Gen").await;
    let pch = seed_chapter(&pool, pbook, 1).await;
    let pv1 = seed_verse(
        &pool,
        pch,
        1,
        "In the beginning was the Word, and the Word was with God.",
        "PRIVATE_V",
    )
    .await;
    seed_embedding(&pool, pv1, &[0.9, 0.1, 0.0, 0.0]).await;

    pool
}
