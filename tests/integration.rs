//! End-to-end HTTP tests: an in-process server over a temporary SQLite
//! corpus, with a stub embedder so the external embedding service is
//! never involved and its call count can be asserted.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;

use scriptorium::config::Config;
use scriptorium::embedding::{vec_to_blob, Embedder};
use scriptorium::error::Result as CoreResult;
use scriptorium::migrate;
use scriptorium::server::{router, AppState};

const DIMS: usize = 4;

// ============ Stub embedder ============

/// Returns a fixed vector and counts calls, so tests can assert that a
/// denied request never reaches the embedding service.
struct StubEmbedder {
    vector: Vec<f32>,
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }

    fn dims(&self) -> usize {
        self.vector.len()
    }
}

// ============ Test app ============

struct TestApp {
    addr: SocketAddr,
    embed_calls: Arc<AtomicUsize>,
    kjv_id: i64,
    private_id: i64,
    tmp: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn spawn_app(query_vector: Vec<f32>) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let mut cfg = Config::minimal();
    cfg.db.path = tmp.path().join("data/scriptorium.sqlite");
    cfg.embedding.dims = Some(DIMS);

    let pool = scriptorium::db::connect(&cfg).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let (kjv_id, private_id) = seed_corpus(&pool).await;

    let embed_calls = Arc::new(AtomicUsize::new(0));
    let embedder = Arc::new(StubEmbedder {
        vector: query_vector,
        calls: embed_calls.clone(),
    });

    let state = AppState::new(cfg, pool, embedder);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        embed_calls,
        kjv_id,
        private_id,
        tmp,
    }
}

// ============ Fixtures ============

async fn insert_version(pool: &SqlitePool, code: &str, name: &str) -> i64 {
    sqlx::query("INSERT INTO versions (code, name, updated_at) VALUES (?, ?, ?)")
        .bind(code)
        .bind(name)
        .bind(1_700_000_000_i64)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn insert_book(pool: &SqlitePool, version_id: i64, number: i64, name: &str, abbr: &str) -> i64 {
    sqlx::query("INSERT INTO books (version_id, number, name, abbreviation) VALUES (?, ?, ?, ?)")
        .bind(version_id)
        .bind(number)
        .bind(name)
        .bind(abbr)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn insert_chapter(pool: &SqlitePool, book_id: i64, number: i64) -> i64 {
    sqlx::query("INSERT INTO chapters (book_id, number) VALUES (?, ?)")
        .bind(book_id)
        .bind(number)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn insert_verse(
    pool: &SqlitePool,
    chapter_id: i64,
    number: i64,
    text: &str,
    version_code: &str,
    embedding: &[f32],
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
    sqlx::query("INSERT INTO verse_vectors (verse_id, embedding) VALUES (?, ?)")
        .bind(verse_id)
        .bind(vec_to_blob(embedding))
        .execute(pool)
        .await
        .unwrap();
    verse_id
}

/// Public KJV with two books and four embedded verses, plus a private
/// version that requires the read capability.
async fn seed_corpus(pool: &SqlitePool) -> (i64, i64) {
    let kjv = insert_version(pool, "KJV", "King James Version").await;

    let matthew = insert_book(pool, kjv, 40, "Matthew", "Mat").await;
    let mat22 = insert_chapter(pool, matthew, 22).await;
    insert_verse(
        pool,
        mat22,
        37,
        "Thou shalt love the Lord thy God with all thy heart, and with all thy soul, and with all thy mind.",
        "KJV",
        &[1.0, 0.0, 0.0, 0.0],
    )
    .await;
    insert_verse(
        pool,
        mat22,
        39,
        "Thou shalt love thy neighbour as thyself.",
        "KJV",
        &[0.95, 0.05, 0.0, 0.0],
    )
    .await;

    let john = insert_book(pool, kjv, 43, "John", "Jhn").await;
    let john3 = insert_chapter(pool, john, 3).await;
    insert_verse(
        pool,
        john3,
        16,
        "For God so loved the world, that he gave his only begotten Son.",
        "KJV",
        &[0.5, 0.5, 0.0, 0.0],
    )
    .await;
    let john13 = insert_chapter(pool, john, 13).await;
    insert_verse(
        pool,
        john13,
        34,
        "A new commandment I give unto you, That ye love one another.",
        "KJV",
        &[0.9, 0.1, 0.0, 0.0],
    )
    .await;

    let private = insert_version(pool, "PRIVATE_V", "Private Draft Version").await;
    let pbook = insert_book(pool, private, 1, "Genesis", "Gen").await;
    let pch = insert_chapter(pool, pbook, 1).await;
    insert_verse(
        pool,
        pch,
        1,
        "My grace is sufficient for thee.",
        "PRIVATE_V",
        &[0.0, 1.0, 0.0, 0.0],
    )
    .await;

    (kjv, private)
}

fn sse_frames(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

// ============ Search ============

#[tokio::test]
async fn test_health() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_search_public_version_end_to_end() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url("/api/bible/v1/search?q=love&version=KJV&top=10"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let results: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 10);

    // Scores strictly non-increasing, no duplicate verse ids, KJV only.
    let mut seen = std::collections::HashSet::new();
    let mut last = f64::INFINITY;
    for r in &results {
        let score = r["score"].as_f64().unwrap();
        assert!(score <= last);
        last = score;
        assert!(seen.insert(r["verse_id"].as_i64().unwrap()));
        assert_eq!(r["version_code"], "KJV");
        assert!(r["book_number"].as_i64().unwrap() > 0);
        assert!(r["chapter_number"].as_i64().unwrap() > 0);
        assert!(r["verse_number"].as_i64().unwrap() > 0);
        assert!(r["text"].as_str().unwrap().len() > 0);
    }

    assert_eq!(app.embed_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_search_respects_top_limit() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url("/api/bible/v1/search?q=love&version=KJV&top=2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let results: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_search_missing_params() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url("/api/bible/v1/search?version=KJV"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "bad_request");

    let resp = reqwest::get(app.url("/api/bible/v1/search?q=love"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Nothing was embedded for rejected requests.
    assert_eq!(app.embed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_rejects_bad_top() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    for top in ["0", "-3", "abc"] {
        let resp = reqwest::get(app.url(&format!(
            "/api/bible/v1/search?q=love&version=KJV&top={}",
            top
        )))
        .await
        .unwrap();
        assert_eq!(resp.status(), 400, "top={}", top);
    }
}

#[tokio::test]
async fn test_search_private_version_denied_before_any_retrieval() {
    let app = spawn_app(vec![0.0, 1.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url("/api/bible/v1/search?q=grace&version=PRIVATE_V"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "forbidden");

    // Denial is cheap: the embedding service was never called.
    assert_eq!(app.embed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_private_version_with_capability() {
    let app = spawn_app(vec![0.0, 1.0, 0.0, 0.0]).await;
    let client = reqwest::Client::new();

    for caps in ["bible:read", "users:write, *"] {
        let resp = client
            .get(app.url("/api/bible/v1/search?q=grace&version=PRIVATE_V"))
            .header("X-Permissions", caps)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "caps={}", caps);

        let results: Vec<serde_json::Value> = resp.json().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["version_code"], "PRIVATE_V");
    }
}

#[tokio::test]
async fn test_search_public_version_with_no_data_is_empty() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    // CUNP-TC is on the public allow-list but has no rows.
    let resp = reqwest::get(app.url("/api/bible/v1/search?q=love&version=CUNP-TC"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let results: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(results.is_empty());
}

// ============ Versions ============

#[tokio::test]
async fn test_versions_filtered_by_capability() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(app.url("/api/bible/v1/versions"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let versions: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["code"], "KJV");

    let resp = client
        .get(app.url("/api/bible/v1/versions"))
        .header("X-Permissions", "bible:read")
        .send()
        .await
        .unwrap();
    let versions: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(versions.len(), 2);
}

// ============ Content streaming ============

#[tokio::test]
async fn test_version_content_sse_frame_sequence() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url(&format!("/api/bible/v1/version/{}", app.kjv_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = resp.text().await.unwrap();
    let frames = sse_frames(&body);
    assert_eq!(frames.len(), 4); // header + 2 books + complete

    assert_eq!(frames[0]["type"], "header");
    assert_eq!(frames[0]["version_code"], "KJV");
    assert_eq!(frames[0]["version_name"], "King James Version");

    assert_eq!(frames[1]["type"], "book");
    assert_eq!(frames[1]["number"], 40);
    assert_eq!(frames[1]["chapters"][0]["verses"][0]["number"], 37);
    assert_eq!(frames[2]["type"], "book");
    assert_eq!(frames[2]["number"], 43);

    assert_eq!(frames[3]["type"], "complete");
    assert_eq!(frames[3]["total_books"], 2);
}

#[tokio::test]
async fn test_version_content_rejections() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url("/api/bible/v1/version/abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = reqwest::get(app.url("/api/bible/v1/version/9999"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Denied before the stream starts: a plain JSON 403, not an SSE body.
    let resp = reqwest::get(app.url(&format!("/api/bible/v1/version/{}", app.private_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "forbidden");
}

#[tokio::test]
async fn test_version_content_private_with_capability() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(app.url(&format!("/api/bible/v1/version/{}", app.private_id)))
        .header("X-Permissions", "bible:read")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = resp.text().await.unwrap();
    let frames = sse_frames(&body);
    assert_eq!(frames[0]["version_code"], "PRIVATE_V");
    assert_eq!(frames.last().unwrap()["type"], "complete");
}

// ============ Vector streaming ============

#[tokio::test]
async fn test_vectors_binary_layout() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url(&format!("/api/bible/v1/vectors/{}", app.kjv_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/octet-stream");

    let bytes = resp.bytes().await.unwrap();
    let record_len = 4 + 4 * DIMS;
    // 4 embedded KJV verses.
    assert_eq!(bytes.len(), 4 * record_len);

    let mut last_id = 0u32;
    for record in bytes.chunks_exact(record_len) {
        let id = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        assert!(id > last_id, "verse ids must be strictly increasing");
        last_id = id;
    }

    // First record is the first seeded verse with its exact embedding.
    let first = &bytes[..record_len];
    let floats: Vec<f32> = first[4..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(floats, vec![1.0, 0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn test_vectors_rejections() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    let resp = reqwest::get(app.url("/api/bible/v1/vectors/9999"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(app.url(&format!("/api/bible/v1/vectors/{}", app.private_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_vectors_corrupt_corpus_fails_before_first_byte() {
    let app = spawn_app(vec![1.0, 0.0, 0.0, 0.0]).await;

    // A fresh pool onto the same database file to corrupt the first record.
    let mut cfg = Config::minimal();
    cfg.db.path = app.tmp.path().join("data/scriptorium.sqlite");
    let pool = scriptorium::db::connect(&cfg).await.unwrap();
    sqlx::query(
        "UPDATE verse_vectors SET embedding = ? WHERE verse_id = \
         (SELECT MIN(verse_id) FROM verse_vectors)",
    )
    .bind(vec![0u8; 8])
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let resp = reqwest::get(app.url(&format!("/api/bible/v1/vectors/{}", app.kjv_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "dimension_mismatch");
}
