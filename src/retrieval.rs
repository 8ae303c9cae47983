//! Concurrent retrieval of the two candidate lists for one search.
//!
//! One similarity query over the version's stored embeddings and one
//! FTS5 keyword query run concurrently against the same version; the
//! coordinator waits for both and fails fast on the first error — a
//! search never silently degrades to a single channel.

use sqlx::{Row, SqlitePool};
use tokio::try_join;

use crate::config::RetrievalConfig;
use crate::embedding::{blob_to_vec, cosine_similarity};
use crate::error::{Result, ScriptoriumError};
use crate::models::SearchHit;

/// Run the vector and keyword queries concurrently, scoped to
/// `version_code`, and return both ranked candidate lists.
///
/// The vector limit is always `top_k`. The keyword limit shrinks for
/// short queries (see [`lexical_limit`]), and keyword hits under the
/// configured relevance floor are dropped — short queries over-match
/// common tokens and would otherwise dominate the merge by volume.
pub async fn search_version(
    pool: &SqlitePool,
    query: &str,
    query_embedding: &[f32],
    version_code: &str,
    top_k: i64,
    retrieval: &RetrievalConfig,
) -> Result<(Vec<SearchHit>, Vec<SearchHit>)> {
    let keyword_limit = lexical_limit(top_k, query, retrieval.short_query_len);

    let (vector_hits, keyword_hits) = try_join!(
        vector_candidates(pool, query_embedding, version_code, top_k),
        keyword_candidates(
            pool,
            query,
            version_code,
            keyword_limit,
            retrieval.min_keyword_score
        ),
    )?;

    Ok((vector_hits, keyword_hits))
}

/// Keyword limit policy: short queries get `max(top_k/2, 5)`, everything
/// else gets `top_k`. The vector limit is never reduced.
pub(crate) fn lexical_limit(top_k: i64, query: &str, short_query_len: usize) -> i64 {
    if query.chars().count() < short_query_len {
        (top_k / 2).max(5)
    } else {
        top_k
    }
}

/// Quote the user query as a single FTS5 phrase so match syntax
/// characters in user input cannot alter the query.
pub(crate) fn fts_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

// ============ Vector channel ============

async fn vector_candidates(
    pool: &SqlitePool,
    query_embedding: &[f32],
    version_code: &str,
    limit: i64,
) -> Result<Vec<SearchHit>> {
    let rows = sqlx::query(
        r#"
        SELECT vv.verse_id, vv.embedding, v.number AS verse_number, v.text,
               c.number AS chapter_number, b.number AS book_number, ver.code AS version_code
        FROM verse_vectors vv
        JOIN verses v ON v.id = vv.verse_id
        JOIN chapters c ON c.id = v.chapter_id
        JOIN books b ON b.id = c.book_id
        JOIN versions ver ON ver.id = b.version_id
        WHERE ver.code = ?
        "#,
    )
    .bind(version_code)
    .fetch_all(pool)
    .await
    .map_err(|e| ScriptoriumError::retrieval(format!("vector query failed: {}", e)))?;

    let expected = query_embedding.len();
    let mut candidates = Vec::with_capacity(rows.len());

    for row in &rows {
        let blob: Vec<u8> = row.get("embedding");
        if blob.len() != expected * 4 {
            return Err(ScriptoriumError::DimensionMismatch {
                expected,
                actual: blob.len() / 4,
            });
        }
        let vec = blob_to_vec(&blob);
        let similarity = cosine_similarity(query_embedding, &vec) as f64;

        candidates.push(SearchHit {
            verse_id: row.get("verse_id"),
            version_code: row.get("version_code"),
            book_number: row.get("book_number"),
            chapter_number: row.get("chapter_number"),
            verse_number: row.get("verse_number"),
            text: row.get("text"),
            score: similarity,
        });
    }

    // Sort by similarity desc and take top K
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(limit.max(0) as usize);

    Ok(candidates)
}

// ============ Keyword channel ============

async fn keyword_candidates(
    pool: &SqlitePool,
    query: &str,
    version_code: &str,
    limit: i64,
    min_score: f64,
) -> Result<Vec<SearchHit>> {
    let rows = sqlx::query(
        r#"
        SELECT verses_fts.verse_id, verses_fts.rank AS rank, v.number AS verse_number, v.text,
               c.number AS chapter_number, b.number AS book_number, ver.code AS version_code
        FROM verses_fts
        JOIN verses v ON v.id = verses_fts.verse_id
        JOIN chapters c ON c.id = v.chapter_id
        JOIN books b ON b.id = c.book_id
        JOIN versions ver ON ver.id = b.version_id
        WHERE verses_fts MATCH ? AND verses_fts.version_code = ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(fts_phrase(query))
    .bind(version_code)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| ScriptoriumError::retrieval(format!("keyword query failed: {}", e)))?;

    let candidates = rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            SearchHit {
                verse_id: row.get("verse_id"),
                version_code: row.get("version_code"),
                book_number: row.get("book_number"),
                chapter_number: row.get("chapter_number"),
                verse_number: row.get("verse_number"),
                text: row.get("text"),
                score: -rank, // negate so higher = better
            }
        })
        .filter(|hit| hit.score >= min_score)
        .collect();

    Ok(candidates)
}
