use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use tokio::sync::Mutex;

use super::{AttributeStore, StoreCounts};
use crate::article::{
    canonical_field_ids, field_key, Article, Attribute, Field, Snippet, VerificationScores,
};
use crate::{Error, Result};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    abstract_text TEXT,
    html_score REAL,
    pdf_score REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE (name, value)
);

CREATE TABLE IF NOT EXISTS attributes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    field_key TEXT NOT NULL,
    UNIQUE (name, field_key)
);

CREATE TABLE IF NOT EXISTS attribute_fields (
    attribute_id INTEGER NOT NULL REFERENCES attributes(id) ON DELETE CASCADE,
    field_id INTEGER NOT NULL REFERENCES fields(id) ON DELETE CASCADE,
    PRIMARY KEY (attribute_id, field_id)
);

CREATE INDEX IF NOT EXISTS idx_attribute_fields_field ON attribute_fields(field_id);

CREATE TABLE IF NOT EXISTS article_attributes (
    article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    attribute_id INTEGER NOT NULL REFERENCES attributes(id) ON DELETE CASCADE,
    PRIMARY KEY (article_id, attribute_id)
);

CREATE TABLE IF NOT EXISTS snippets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (article_id, name, text)
);
"#;

struct Inner {
    conn: SqliteConnection,
    in_transaction: bool,
}

/// SQLite-backed store over a single locked connection. Each call holds the
/// lock on its own, so a find and the following insert can interleave with
/// another caller; the UNIQUE constraints reject the losing insert.
pub struct SqliteStore {
    inner: Mutex<Inner>,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        Self::connect(options).await
    }

    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let mut conn = options.connect().await?;
        sqlx::query(INIT_SQL).execute(&mut conn).await?;

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                in_transaction: false,
            }),
        })
    }

    async fn attribute_field_ids(conn: &mut SqliteConnection, attribute_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT field_id FROM attribute_fields WHERE attribute_id = ? ORDER BY field_id",
        )
        .bind(attribute_id)
        .fetch_all(conn)
        .await?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl AttributeStore for SqliteStore {
    async fn begin(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.in_transaction {
            return Err(Error::TransactionOpen);
        }
        sqlx::query("BEGIN").execute(&mut inner.conn).await?;
        inner.in_transaction = true;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.in_transaction {
            return Err(Error::NoTransaction);
        }
        sqlx::query("COMMIT").execute(&mut inner.conn).await?;
        inner.in_transaction = false;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.in_transaction {
            return Err(Error::NoTransaction);
        }
        sqlx::query("ROLLBACK").execute(&mut inner.conn).await?;
        inner.in_transaction = false;
        Ok(())
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        let mut inner = self.inner.lock().await;
        sqlx::query(
            r#"
            INSERT INTO articles (id, abstract_text, html_score, pdf_score, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                abstract_text = excluded.abstract_text,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&article.id)
        .bind(&article.abstract_text)
        .bind(article.scores.html)
        .bind(article.scores.pdf)
        .bind(article.created_at.to_rfc3339())
        .bind(article.updated_at.to_rfc3339())
        .execute(&mut inner.conn)
        .await?;

        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Article> {
        let mut inner = self.inner.lock().await;
        let row: ArticleRow = sqlx::query_as(
            r#"
            SELECT id, abstract_text, html_score, pdf_score, created_at, updated_at
            FROM articles WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut inner.conn)
        .await?
        .ok_or_else(|| Error::ArticleNotFound(id.to_string()))?;

        parse_article_row(row)
    }

    async fn list_article_ids(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let ids = sqlx::query_scalar("SELECT id FROM articles ORDER BY id")
            .fetch_all(&mut inner.conn)
            .await?;
        Ok(ids)
    }

    async fn set_scores(&self, id: &str, scores: VerificationScores) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let result = sqlx::query(
            "UPDATE articles SET html_score = ?, pdf_score = ?, updated_at = ? WHERE id = ?",
        )
        .bind(scores.html)
        .bind(scores.pdf)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut inner.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ArticleNotFound(id.to_string()));
        }

        Ok(())
    }

    async fn find_field(&self, name: &str, value: &str) -> Result<Option<Field>> {
        let mut inner = self.inner.lock().await;
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, value FROM fields WHERE name = ? AND value = ?")
                .bind(name)
                .bind(value)
                .fetch_all(&mut inner.conn)
                .await?;

        if rows.len() > 1 {
            return Err(Error::AmbiguousField {
                name: name.to_string(),
                value: value.to_string(),
                count: rows.len(),
            });
        }

        Ok(rows
            .into_iter()
            .next()
            .map(|(id, name, value)| Field { id, name, value }))
    }

    async fn insert_field(&self, name: &str, value: &str) -> Result<Field> {
        let mut inner = self.inner.lock().await;
        let result = sqlx::query("INSERT INTO fields (name, value) VALUES (?, ?)")
            .bind(name)
            .bind(value)
            .execute(&mut inner.conn)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.is_unique_violation() {
                        return Error::DuplicateField {
                            name: name.to_string(),
                            value: value.to_string(),
                        };
                    }
                }
                Error::Database(e)
            })?;

        Ok(Field {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    async fn find_attribute(&self, name: &str, field_ids: &[i64]) -> Result<Option<Attribute>> {
        let mut inner = self.inner.lock().await;
        let key = field_key(field_ids);
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, category FROM attributes WHERE name = ? AND field_key = ?")
                .bind(name)
                .bind(&key)
                .fetch_all(&mut inner.conn)
                .await?;

        if rows.len() > 1 {
            return Err(Error::AmbiguousAttribute {
                name: name.to_string(),
                fields: canonical_field_ids(field_ids).len(),
                count: rows.len(),
            });
        }

        let Some((id, name, category)) = rows.into_iter().next() else {
            return Ok(None);
        };
        let field_ids = Self::attribute_field_ids(&mut inner.conn, id).await?;

        Ok(Some(Attribute {
            id,
            name,
            category,
            field_ids,
        }))
    }

    async fn insert_attribute(&self, name: &str, category: &str, field_ids: &[i64]) -> Result<Attribute> {
        let mut inner = self.inner.lock().await;
        let field_ids = canonical_field_ids(field_ids);
        let key = field_key(&field_ids);

        let result = sqlx::query("INSERT INTO attributes (name, category, field_key) VALUES (?, ?, ?)")
            .bind(name)
            .bind(category)
            .bind(&key)
            .execute(&mut inner.conn)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.is_unique_violation() {
                        return Error::DuplicateAttribute {
                            name: name.to_string(),
                            field_key: key.clone(),
                        };
                    }
                }
                Error::Database(e)
            })?;
        let id = result.last_insert_rowid();

        for field_id in &field_ids {
            sqlx::query("INSERT INTO attribute_fields (attribute_id, field_id) VALUES (?, ?)")
                .bind(id)
                .bind(field_id)
                .execute(&mut inner.conn)
                .await?;
        }

        Ok(Attribute {
            id,
            name: name.to_string(),
            category: category.to_string(),
            field_ids,
        })
    }

    async fn get_attribute(&self, id: i64) -> Result<Attribute> {
        let mut inner = self.inner.lock().await;
        let (id, name, category): (i64, String, String) =
            sqlx::query_as("SELECT id, name, category FROM attributes WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut inner.conn)
                .await?
                .ok_or(Error::AttributeNotFound(id))?;
        let field_ids = Self::attribute_field_ids(&mut inner.conn, id).await?;

        Ok(Attribute {
            id,
            name,
            category,
            field_ids,
        })
    }

    async fn article_attribute_ids(&self, article_id: &str) -> Result<Vec<i64>> {
        let mut inner = self.inner.lock().await;
        let ids = sqlx::query_scalar(
            "SELECT attribute_id FROM article_attributes WHERE article_id = ? ORDER BY attribute_id",
        )
        .bind(article_id)
        .fetch_all(&mut inner.conn)
        .await?;
        Ok(ids)
    }

    async fn attach_attribute(&self, article_id: &str, attribute_id: i64) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO article_attributes (article_id, attribute_id) VALUES (?, ?)",
        )
        .bind(article_id)
        .bind(attribute_id)
        .execute(&mut inner.conn)
        .await
        .map_err(|e| missing_article(e, article_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn detach_all(&self, article_id: &str) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let result = sqlx::query("DELETE FROM article_attributes WHERE article_id = ?")
            .bind(article_id)
            .execute(&mut inner.conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn article_snippets(&self, article_id: &str) -> Result<Vec<Snippet>> {
        let mut inner = self.inner.lock().await;
        let rows: Vec<(i64, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, article_id, name, text, created_at
            FROM snippets WHERE article_id = ? ORDER BY id
            "#,
        )
        .bind(article_id)
        .fetch_all(&mut inner.conn)
        .await?;

        rows.into_iter().map(parse_snippet_row).collect()
    }

    async fn insert_snippet(&self, article_id: &str, name: &str, text: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO snippets (article_id, name, text, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(article_id)
        .bind(name)
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut inner.conn)
        .await
        .map_err(|e| missing_article(e, article_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_all_attributes(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        sqlx::query(
            r#"
            DELETE FROM article_attributes;
            DELETE FROM snippets;
            DELETE FROM attribute_fields;
            DELETE FROM attributes;
            DELETE FROM fields;
            "#,
        )
        .execute(&mut inner.conn)
        .await?;
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let mut inner = self.inner.lock().await;
        let (articles, fields, attributes, attachments, snippets): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM articles),
                    (SELECT COUNT(*) FROM fields),
                    (SELECT COUNT(*) FROM attributes),
                    (SELECT COUNT(*) FROM article_attributes),
                    (SELECT COUNT(*) FROM snippets)
                "#,
            )
            .fetch_one(&mut inner.conn)
            .await?;

        Ok(StoreCounts {
            articles: articles.unsigned_abs(),
            fields: fields.unsigned_abs(),
            attributes: attributes.unsigned_abs(),
            attachments: attachments.unsigned_abs(),
            snippets: snippets.unsigned_abs(),
        })
    }
}

type ArticleRow = (String, Option<String>, Option<f64>, Option<f64>, String, String);

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn parse_article_row(row: ArticleRow) -> Result<Article> {
    let (id, abstract_text, html, pdf, created_at, updated_at) = row;

    Ok(Article {
        id,
        abstract_text,
        scores: VerificationScores { html, pdf },
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_snippet_row(row: (i64, String, String, String, String)) -> Result<Snippet> {
    let (id, article_id, name, text, created_at) = row;

    Ok(Snippet {
        id,
        article_id,
        name,
        text,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn missing_article(e: sqlx::Error, article_id: &str) -> Error {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_foreign_key_violation() {
            return Error::ArticleNotFound(article_id.to_string());
        }
    }
    Error::Database(e)
}
