use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::recipe::ExtractionStep;

/// A watched page and the recipe used to find its latest post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogDefinition {
    pub id: i64,
    pub name: String,
    pub main_url: String,
    /// Message template with `{name}` and `{url}` placeholders
    pub notif_text: String,
    pub steps: Vec<ExtractionStep>,
}

#[derive(Debug, sqlx::FromRow)]
struct BlogRow {
    id: i64,
    name: String,
    main_url: String,
    notif_text: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StepRow {
    step_idx: i64,
    step_type: String,
    tag_name: Option<String>,
    tag_class: Option<String>,
    tag_id: Option<String>,
}

/// Blog definitions and last-seen links, backed by the `blogs` and `parse_logic` tables.
pub struct BlogRepository {
    pool: SqlitePool,
}

impl BlogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the tables if they do not exist yet. Existing data is left untouched.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blogs (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                main_url TEXT NOT NULL,
                notif_text TEXT NOT NULL,
                last_link TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create blogs table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS parse_logic (
                blog_id INTEGER NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
                step_idx INTEGER NOT NULL,
                step_type TEXT NOT NULL,
                tag_name TEXT,
                tag_class TEXT,
                tag_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create parse_logic table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_parse_logic_blog ON parse_logic (blog_id, step_idx)",
        )
        .execute(&self.pool)
        .await
        .context("failed to create parse_logic index")?;

        Ok(())
    }

    /// Load every blog with its recipe, in id order.
    /// Blogs whose stored recipe cannot be decoded are logged and left out.
    pub async fn list_blogs(&self) -> Result<Vec<BlogDefinition>> {
        let rows = sqlx::query_as::<_, BlogRow>(
            "SELECT id, name, main_url, notif_text FROM blogs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list blogs")?;

        let mut blogs = Vec::with_capacity(rows.len());
        for row in rows {
            let decoded: std::result::Result<Vec<_>, _> = self
                .step_rows(row.id)
                .await?
                .into_iter()
                .map(|r| {
                    let step_idx = r.step_idx;
                    ExtractionStep::from_row(&r.step_type, r.tag_name, r.tag_class, r.tag_id)
                        .map_err(|err| (step_idx, err))
                })
                .collect();

            let steps = match decoded {
                Ok(steps) => steps,
                Err((step_idx, err)) => {
                    warn!(blog = %row.name, step_idx, %err, "skipping blog with invalid parse logic");
                    continue;
                }
            };

            blogs.push(BlogDefinition {
                id: row.id,
                name: row.name,
                main_url: row.main_url,
                notif_text: row.notif_text,
                steps,
            });
        }

        debug!("loaded {} blogs", blogs.len());
        Ok(blogs)
    }

    async fn step_rows(&self, blog_id: i64) -> Result<Vec<StepRow>> {
        sqlx::query_as::<_, StepRow>(
            r#"
            SELECT step_idx, step_type, tag_name, tag_class, tag_id
            FROM parse_logic
            WHERE blog_id = ?
            ORDER BY step_idx
            "#,
        )
        .bind(blog_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load parse logic for blog {}", blog_id))
    }

    /// Last link notified for `blog_id`; `None` if nothing was stored yet.
    pub async fn last_link(&self, blog_id: i64) -> Result<Option<String>> {
        let link = sqlx::query_scalar::<_, Option<String>>("SELECT last_link FROM blogs WHERE id = ?")
            .bind(blog_id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to read last link of blog {}", blog_id))?;

        Ok(link)
    }

    /// Insert a blog and its recipe in one transaction. Returns the new blog id.
    /// Used to seed a store; the polling pass only reads blog definitions.
    pub async fn insert_blog(
        &self,
        name: &str,
        main_url: &str,
        notif_text: &str,
        steps: &[ExtractionStep],
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        let blog_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO blogs (name, main_url, notif_text) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(main_url)
        .bind(notif_text)
        .fetch_one(&mut tx)
        .await
        .with_context(|| format!("failed to insert blog {}", name))?;

        for (idx, step) in steps.iter().enumerate() {
            let (step_type, tag_name, tag_class, tag_id) = match step {
                ExtractionStep::Find {
                    tag_name,
                    tag_class,
                    tag_id,
                } => ("find", tag_name.as_deref(), tag_class.as_deref(), tag_id.as_deref()),
                ExtractionStep::GetAttribute { attribute_name } => {
                    ("get", Some(attribute_name.as_str()), None, None)
                }
            };

            sqlx::query(
                r#"
                INSERT INTO parse_logic (blog_id, step_idx, step_type, tag_name, tag_class, tag_id)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(blog_id)
            .bind(idx as i64)
            .bind(step_type)
            .bind(tag_name)
            .bind(tag_class)
            .bind(tag_id)
            .execute(&mut tx)
            .await
            .with_context(|| format!("failed to insert parse logic step {} for {}", idx, name))?;
        }

        tx.commit().await.context("failed to commit blog insert")?;
        Ok(blog_id)
    }

    pub async fn set_last_link(&self, blog_id: i64, link: &str) -> Result<()> {
        let result = sqlx::query("UPDATE blogs SET last_link = ? WHERE id = ?")
            .bind(link)
            .bind(blog_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to save last link of blog {}", blog_id))?;

        if result.rows_affected() == 0 {
            anyhow::bail!("no blog with id {}", blog_id);
        }

        Ok(())
    }
}
