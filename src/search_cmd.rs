use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::fusion;
use crate::retrieval;

/// Run a hybrid search from the CLI and print ranked results.
///
/// Operator tool: talks to the corpus directly, so no capability check
/// applies. The HTTP server is where access is enforced.
pub async fn run_search(config: &Config, query: &str, version: &str, top: i64) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    if top < 1 {
        bail!("top must be >= 1");
    }

    let pool = db::connect(config).await?;
    let embedder = create_embedder(&config.embedding)?;

    let query_embedding = embedder.embed(query).await?;
    let (vector_hits, keyword_hits) = retrieval::search_version(
        &pool,
        query,
        &query_embedding,
        version,
        top,
        &config.retrieval,
    )
    .await?;

    let results = fusion::fuse(vector_hits, keyword_hits, top as usize);

    if results.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} {}:{}:{}",
            i + 1,
            result.score,
            result.hit.version_code,
            result.hit.book_number,
            result.hit.chapter_number,
            result.hit.verse_number
        );
        println!("    {}", result.hit.text.replace('\n', " ").trim());
        println!();
    }

    pool.close().await;
    Ok(())
}
