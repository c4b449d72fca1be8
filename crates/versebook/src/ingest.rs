//! Corpus ingestion from JSON documents.
//!
//! A corpus document is one translation: a list of books, each a list of
//! chapters, each a list of numbered verses. Ingestion replaces the whole
//! translation inside a single transaction, so a failed run leaves the
//! previous corpus untouched. Any schema violation aborts the run with
//! [`SearchError::MalformedCorpus`] before the transaction commits.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use sqlx::SqlitePool;
use walkdir::WalkDir;

use versebook_core::error::{Result, SearchError};
use versebook_core::models::verse_id;

use crate::config::Config;
use crate::db;

#[derive(Debug, Deserialize)]
struct CorpusDoc {
    #[serde(default)]
    translation: Option<String>,
    books: Vec<BookDoc>,
}

#[derive(Debug, Deserialize)]
struct BookDoc {
    name: String,
    chapters: Vec<ChapterDoc>,
}

#[derive(Debug, Deserialize)]
struct ChapterDoc {
    chapter: i64,
    verses: Vec<VerseDoc>,
}

#[derive(Debug, Deserialize)]
struct VerseDoc {
    verse: i64,
    text: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: usize,
    pub translations: Vec<String>,
    pub books: usize,
    pub verses: usize,
}

/// Ingest a corpus file, or every `.json` file under a directory.
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    translation: Option<&str>,
) -> Result<IngestReport> {
    let pool = db::connect(config).await.map_err(SearchError::Other)?;
    crate::migrate::apply_schema(&pool)
        .await
        .map_err(SearchError::Other)?;
    let report = ingest_path(&pool, path, translation).await;
    pool.close().await;
    report
}

/// Directory-or-file dispatch, sharing one pool.
pub async fn ingest_path(
    pool: &SqlitePool,
    path: &Path,
    translation: Option<&str>,
) -> Result<IngestReport> {
    let mut files: Vec<std::path::PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry
                .map_err(anyhow::Error::from)
                .context("walk corpus directory")?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some("json")
            {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(SearchError::MalformedCorpus(format!(
                "no .json corpus files under {}",
                path.display()
            )));
        }
    } else {
        files.push(path.to_path_buf());
    }

    let mut report = IngestReport::default();
    for file in &files {
        let one = ingest_file(pool, file, translation).await?;
        report.files += 1;
        report.translations.extend(one.translations);
        report.books += one.books;
        report.verses += one.verses;
    }
    Ok(report)
}

async fn ingest_file(
    pool: &SqlitePool,
    path: &Path,
    translation: Option<&str>,
) -> Result<IngestReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;

    let doc: CorpusDoc = serde_json::from_str(&content)
        .map_err(|e| SearchError::MalformedCorpus(format!("{}: {}", path.display(), e)))?;

    // Precedence: --translation flag, then the document's own field, then
    // the file stem (`kjv.json` -> "kjv").
    let translation = translation
        .map(str::to_string)
        .or(doc.translation.clone())
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            SearchError::MalformedCorpus(format!(
                "{}: cannot determine translation name",
                path.display()
            ))
        })?;

    validate(&doc, path)?;

    let mut tx = pool.begin().await.context("begin ingest transaction")?;

    // Replace the translation wholesale.
    sqlx::query(
        "DELETE FROM verses_fts WHERE verse_id IN (SELECT id FROM verses WHERE translation = ?1)",
    )
    .bind(&translation)
    .execute(&mut *tx)
    .await
    .context("clear old FTS rows")?;
    sqlx::query("DELETE FROM verses WHERE translation = ?1")
        .bind(&translation)
        .execute(&mut *tx)
        .await
        .context("clear old verses")?;

    let mut verse_total = 0usize;
    for (book_order, book) in doc.books.iter().enumerate() {
        for chapter in &book.chapters {
            for verse in &chapter.verses {
                let id = verse_id(&translation, &book.name, chapter.chapter, verse.verse);
                sqlx::query(
                    r#"
                    INSERT INTO verses (id, translation, book, book_order, chapter, verse, text)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(&id)
                .bind(&translation)
                .bind(&book.name)
                .bind(book_order as i64)
                .bind(chapter.chapter)
                .bind(verse.verse)
                .bind(&verse.text)
                .execute(&mut *tx)
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                        SearchError::MalformedCorpus(format!("duplicate verse {}", id))
                    }
                    other => SearchError::Other(anyhow::Error::new(other).context("insert verse")),
                })?;

                sqlx::query("INSERT INTO verses_fts (verse_id, text) VALUES (?1, ?2)")
                    .bind(&id)
                    .bind(&verse.text)
                    .execute(&mut *tx)
                    .await
                    .context("insert FTS row")?;

                verse_total += 1;
            }
        }
    }

    tx.commit().await.context("commit ingest")?;

    tracing::info!(
        translation,
        books = doc.books.len(),
        verses = verse_total,
        "ingested corpus"
    );

    Ok(IngestReport {
        files: 1,
        translations: vec![translation],
        books: doc.books.len(),
        verses: verse_total,
    })
}

fn validate(doc: &CorpusDoc, path: &Path) -> Result<()> {
    let malformed =
        |msg: String| SearchError::MalformedCorpus(format!("{}: {}", path.display(), msg));

    if doc.books.is_empty() {
        return Err(malformed("corpus has no books".to_string()));
    }
    for book in &doc.books {
        if book.name.trim().is_empty() {
            return Err(malformed("book with empty name".to_string()));
        }
        for chapter in &book.chapters {
            if chapter.chapter < 1 {
                return Err(malformed(format!(
                    "book '{}' has chapter number {}",
                    book.name, chapter.chapter
                )));
            }
            for verse in &chapter.verses {
                if verse.verse < 1 {
                    return Err(malformed(format!(
                        "{} {} has verse number {}",
                        book.name, chapter.chapter, verse.verse
                    )));
                }
                if verse.text.trim().is_empty() {
                    return Err(malformed(format!(
                        "{} {}:{} has empty text",
                        book.name, chapter.chapter, verse.verse
                    )));
                }
            }
        }
    }
    Ok(())
}
