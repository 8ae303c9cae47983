//! Incremental delivery of whole-version content and raw embeddings.
//!
//! Both streamers follow the same shape: one spawned producer task reads
//! from the corpus and writes into a bounded channel; the HTTP response
//! body drains it. The bounded channel is the backpressure mechanism:
//! a slow consumer blocks the producer instead of growing memory.
//!
//! Cancellation is cooperative. The producer checks the deadline and the
//! channel at every iteration boundary (book or vector record), so a
//! disconnected caller or an expired deadline stops work within one unit,
//! never after the whole version has been materialized.
//!
//! Content frames are JSON and can carry a terminal error or timeout
//! frame. The vector stream is raw bytes: once records are in flight
//! there is no way to signal a structured error, so failures there
//! terminate the stream cleanly and are only logged.

use std::time::Duration;

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::StreamConfig;
use crate::error::Result;
use crate::models::{BookContent, ChapterContent, Version, VerseContent};

/// One frame of the content stream.
///
/// Sequence: `Header`, zero or more `Book` frames, then exactly one of
/// `Complete`, `Error`, or `Timeout`. A book is the unit of incremental
/// delivery and is never split across frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentFrame {
    Header {
        version_id: i64,
        version_code: String,
        version_name: String,
        updated_at: i64,
    },
    Book(BookContent),
    Complete {
        total_books: u64,
    },
    Error {
        message: String,
    },
    Timeout,
}

/// Look up a version row by id.
pub async fn fetch_version(pool: &SqlitePool, version_id: i64) -> Result<Option<Version>> {
    let row = sqlx::query("SELECT id, code, name, updated_at FROM versions WHERE id = ?")
        .bind(version_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| Version {
        id: r.get("id"),
        code: r.get("code"),
        name: r.get("name"),
        updated_at: r.get("updated_at"),
    }))
}

/// Dimension of the first stored embedding for a version, if any.
///
/// Lets the vectors endpoint reject a corrupt corpus with a structured
/// error before the first byte goes out.
pub async fn first_record_dims(pool: &SqlitePool, version_id: i64) -> Result<Option<usize>> {
    let len: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT length(vv.embedding)
        FROM verse_vectors vv
        JOIN verses v ON v.id = vv.verse_id
        JOIN chapters c ON c.id = v.chapter_id
        JOIN books b ON b.id = c.book_id
        WHERE b.version_id = ?
        ORDER BY vv.verse_id ASC
        LIMIT 1
        "#,
    )
    .bind(version_id)
    .fetch_optional(pool)
    .await?;

    Ok(len.map(|l| (l / 4) as usize))
}

// ============ Content streaming ============

/// Spawn the content producer for `version` and return the frame channel.
pub fn stream_content(
    pool: SqlitePool,
    version: Version,
    cfg: &StreamConfig,
) -> mpsc::Receiver<ContentFrame> {
    let (tx, rx) = mpsc::channel(cfg.content_buffer);
    let deadline = Instant::now() + Duration::from_secs(cfg.deadline_secs);
    tokio::spawn(content_producer(pool, version, deadline, tx));
    rx
}

pub(crate) async fn content_producer(
    pool: SqlitePool,
    version: Version,
    deadline: Instant,
    tx: mpsc::Sender<ContentFrame>,
) {
    let header = ContentFrame::Header {
        version_id: version.id,
        version_code: version.code.clone(),
        version_name: version.name.clone(),
        updated_at: version.updated_at,
    };
    if tx.send(header).await.is_err() {
        return; // caller already gone
    }

    let book_rows = match sqlx::query(
        "SELECT id, number, name, abbreviation FROM books WHERE version_id = ? ORDER BY number ASC",
    )
    .bind(version.id)
    .fetch_all(&pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            let _ = tx
                .send(ContentFrame::Error {
                    message: format!("failed to fetch books: {}", e),
                })
                .await;
            return;
        }
    };

    let mut total_books = 0u64;
    for row in book_rows {
        if tx.is_closed() {
            tracing::debug!(version_id = version.id, "client disconnected, stopping content stream");
            return;
        }
        if Instant::now() >= deadline {
            tracing::warn!(version_id = version.id, "content stream deadline exceeded");
            let _ = tx.send(ContentFrame::Timeout).await;
            return;
        }

        let book = match load_book(
            &pool,
            row.get("id"),
            row.get("number"),
            row.get("name"),
            row.get("abbreviation"),
        )
        .await
        {
            Ok(book) => book,
            Err(e) => {
                let _ = tx
                    .send(ContentFrame::Error {
                        message: format!("failed to load book: {}", e),
                    })
                    .await;
                return;
            }
        };

        if tx.send(ContentFrame::Book(book)).await.is_err() {
            return;
        }
        total_books += 1;
    }

    let _ = tx.send(ContentFrame::Complete { total_books }).await;
}

/// Materialize one book with its chapters and verses, in order.
async fn load_book(
    pool: &SqlitePool,
    book_id: i64,
    number: i64,
    name: String,
    abbreviation: String,
) -> std::result::Result<BookContent, sqlx::Error> {
    let chapter_rows =
        sqlx::query("SELECT id, number FROM chapters WHERE book_id = ? ORDER BY number ASC")
            .bind(book_id)
            .fetch_all(pool)
            .await?;

    let mut chapters = Vec::with_capacity(chapter_rows.len());
    for chapter_row in chapter_rows {
        let chapter_id: i64 = chapter_row.get("id");
        let verse_rows =
            sqlx::query("SELECT id, number, text FROM verses WHERE chapter_id = ? ORDER BY number ASC")
                .bind(chapter_id)
                .fetch_all(pool)
                .await?;

        let verses = verse_rows
            .iter()
            .map(|v| VerseContent {
                id: v.get("id"),
                number: v.get("number"),
                text: v.get("text"),
            })
            .collect();

        chapters.push(ChapterContent {
            id: chapter_id,
            number: chapter_row.get("number"),
            verses,
        });
    }

    Ok(BookContent {
        id: book_id,
        number,
        name,
        abbreviation,
        chapters,
    })
}

// ============ Vector streaming ============

/// Spawn the vector producer for a version and return the batch channel.
///
/// Each batch is a dense concatenation of records
/// `[verse_id: u32 LE][dims × f32 LE]` in ascending verse id order.
pub fn stream_vectors(
    pool: SqlitePool,
    version_id: i64,
    dims: usize,
    cfg: &StreamConfig,
) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(cfg.vector_buffer);
    let deadline = Instant::now() + Duration::from_secs(cfg.deadline_secs);
    tokio::spawn(vector_producer(
        pool,
        version_id,
        dims,
        cfg.vector_batch,
        deadline,
        tx,
    ));
    rx
}

pub(crate) async fn vector_producer(
    pool: SqlitePool,
    version_id: i64,
    dims: usize,
    batch_size: usize,
    deadline: Instant,
    tx: mpsc::Sender<Vec<u8>>,
) {
    let record_len = 4 + dims * 4;
    let batch_len = batch_size * record_len;
    let mut buf: Vec<u8> = Vec::with_capacity(batch_len);

    let mut rows = sqlx::query(
        r#"
        SELECT vv.verse_id, vv.embedding
        FROM verse_vectors vv
        JOIN verses v ON v.id = vv.verse_id
        JOIN chapters c ON c.id = v.chapter_id
        JOIN books b ON b.id = c.book_id
        WHERE b.version_id = ?
        ORDER BY vv.verse_id ASC
        "#,
    )
    .bind(version_id)
    .fetch(&pool);

    loop {
        let row = match rows.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(version_id, error = %e, "vector stream read failed, terminating");
                return;
            }
        };

        if tx.is_closed() {
            tracing::debug!(version_id, "client disconnected, stopping vector stream");
            return;
        }
        if Instant::now() >= deadline {
            tracing::warn!(version_id, "vector stream deadline exceeded");
            return;
        }

        let verse_id: i64 = row.get("verse_id");
        let blob: Vec<u8> = row.get("embedding");
        if blob.len() != dims * 4 {
            // No structured error is possible once bytes are in flight.
            tracing::error!(
                version_id,
                verse_id,
                expected = dims,
                actual = blob.len() / 4,
                "embedding dimension mismatch, terminating vector stream"
            );
            return;
        }

        // A record is atomic: id and vector enter the buffer together and
        // are flushed in the same write.
        buf.extend_from_slice(&(verse_id as u32).to_le_bytes());
        buf.extend_from_slice(&blob);

        if buf.len() >= batch_len {
            let batch = std::mem::replace(&mut buf, Vec::with_capacity(batch_len));
            if tx.send(batch).await.is_err() {
                return;
            }
        }
    }

    if !buf.is_empty() {
        let _ = tx.send(buf).await;
    }
}
