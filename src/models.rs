//! Core data models for the scripture corpus and its API shapes.
//!
//! The corpus hierarchy is version → book → chapter → verse, with one
//! embedding vector per verse. Search results flow through two shapes:
//! [`SearchHit`] (one candidate from a single retrieval channel, carrying
//! that channel's own score) and [`FusedResult`] (the merged hit with its
//! combined rank-fusion score — the only score callers see).

use serde::{Deserialize, Serialize};

/// A scripture version row.
#[derive(Debug, Clone)]
pub struct Version {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub updated_at: i64,
}

/// Version list entry returned by `GET /versions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub updated_at: i64,
}

/// A fully materialized book, the unit of incremental content delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookContent {
    pub id: i64,
    pub number: i64,
    pub name: String,
    pub abbreviation: String,
    pub chapters: Vec<ChapterContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterContent {
    pub id: i64,
    pub number: i64,
    pub verses: Vec<VerseContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseContent {
    pub id: i64,
    pub number: i64,
    pub text: String,
}

/// One ranked candidate from a single retrieval channel.
///
/// `score` is channel-specific (cosine similarity for the vector channel,
/// negated bm25 rank for the keyword channel) and is never serialized —
/// fusion is rank-based, and only the combined score goes on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub verse_id: i64,
    pub version_code: String,
    pub book_number: i64,
    pub chapter_number: i64,
    pub verse_number: i64,
    pub text: String,
    #[serde(skip)]
    pub score: f64,
}

/// A merged search result with its combined rank-fusion score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub score: f64,
}
