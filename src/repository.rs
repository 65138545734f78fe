use crate::{
    access::VisibilityScope,
    filters::ArticleFilter,
    models::{
        Article, ArticleChanges, ArticleDraft, Comment, MediaObject, PageRequest, RelatedArticle,
        User,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::RwLock;

/// Repository Trait
///
/// The persistence contract. Every article read takes a `VisibilityScope` so
/// the visibility rule is applied by the query itself (before counting and
/// paging), never by filtering results afterwards.
///
/// Mutations take plain ids: handlers resolve the row through the scope and run
/// `authorize_edit` first.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Returns the local user for an external subject, creating it on first sight.
    async fn find_or_create_user(&self, clerk_user_id: &str) -> Result<User, sqlx::Error>;

    // --- Articles ---
    /// One page of visible, filtered articles plus the total count before paging.
    async fn list_articles(
        &self,
        scope: &VisibilityScope,
        filter: &ArticleFilter,
        page: PageRequest,
    ) -> Result<(Vec<Article>, i64), sqlx::Error>;
    async fn get_article(
        &self,
        id: i64,
        scope: &VisibilityScope,
    ) -> Result<Option<Article>, sqlx::Error>;
    async fn create_article(
        &self,
        draft: ArticleDraft,
        created_by: &str,
    ) -> Result<Article, sqlx::Error>;
    async fn update_article(
        &self,
        id: i64,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, sqlx::Error>;
    async fn publish_article(&self, id: i64) -> Result<Option<Article>, sqlx::Error>;
    /// Deletes the article and, by cascade, its comments and relation rows.
    async fn delete_article(&self, id: i64) -> Result<bool, sqlx::Error>;
    /// Related articles of `id` that are themselves visible under `scope`.
    async fn related_articles(
        &self,
        id: i64,
        scope: &VisibilityScope,
    ) -> Result<Vec<RelatedArticle>, sqlx::Error>;
    /// The subset of `ids` that exist, used to validate `relatedArticles`.
    async fn existing_article_ids(&self, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error>;

    // --- Comments ---
    async fn list_comments(
        &self,
        article_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Comment>, i64), sqlx::Error>;
    /// Every comment of an article, oldest first (embedded in the article item).
    async fn comments_for_article(&self, article_id: i64) -> Result<Vec<Comment>, sqlx::Error>;
    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, sqlx::Error>;
    /// `Err(RowNotFound)` when the article does not exist.
    async fn create_comment(
        &self,
        article_id: i64,
        content: String,
        created_by: &str,
    ) -> Result<Comment, sqlx::Error>;
    /// `Ok(None)` when the comment does not exist, `Err(RowNotFound)` when the
    /// target article of a move does not.
    async fn update_comment(
        &self,
        id: i64,
        content: Option<String>,
        article_id: Option<i64>,
    ) -> Result<Option<Comment>, sqlx::Error>;
    async fn delete_comment(&self, id: i64) -> Result<bool, sqlx::Error>;

    // --- Media ---
    async fn create_media_object(
        &self,
        file_path: &str,
        content_type: &str,
    ) -> Result<MediaObject, sqlx::Error>;
    async fn get_media_object(&self, id: i64) -> Result<Option<MediaObject>, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// Columns of `Article`, with the comment count computed inline.
const ARTICLE_COLUMNS: &str = r#"
    a.id, a.title, a.content, a.published, a.tags, a.date, a.image_id,
    a.created_by, a.created_at, a.updated_at,
    (SELECT COUNT(*) FROM comments c WHERE c.article_id = a.id) AS comment_count
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_article_unscoped(&self, id: i64) -> Result<Option<Article>, sqlx::Error> {
        self.get_article(id, &VisibilityScope::Everything).await
    }

    async fn replace_related(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        related_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM article_related WHERE source_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        if !related_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO article_related (source_id, target_id)
                SELECT $1, target FROM UNNEST($2::BIGINT[]) AS target
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(related_ids)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// find_or_create_user
    ///
    /// Single round trip: the no-op `DO UPDATE` makes `RETURNING` yield the
    /// existing row on conflict.
    async fn find_or_create_user(&self, clerk_user_id: &str) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (clerk_user_id) VALUES ($1)
            ON CONFLICT (clerk_user_id) DO UPDATE SET clerk_user_id = EXCLUDED.clerk_user_id
            RETURNING id, clerk_user_id, is_admin
            "#,
        )
        .bind(clerk_user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// list_articles
    ///
    /// Builds the page query and the count query from the same predicates via
    /// `QueryBuilder`, so `totalItems` always matches what paging walks over.
    async fn list_articles(
        &self,
        scope: &VisibilityScope,
        filter: &ArticleFilter,
        page: PageRequest,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM articles a WHERE TRUE");
        scope.push_predicate(&mut count, "a");
        filter.push_predicates(&mut count, "a");
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE TRUE"));
        scope.push_predicate(&mut select, "a");
        filter.push_predicates(&mut select, "a");
        filter.push_order(&mut select, "a");
        select.push(" LIMIT ");
        select.push_bind(page.per_page);
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let articles = select
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?;
        Ok((articles, total))
    }

    async fn get_article(
        &self,
        id: i64,
        scope: &VisibilityScope,
    ) -> Result<Option<Article>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.id = "));
        builder.push_bind(id);
        scope.push_predicate(&mut builder, "a");

        builder
            .build_query_as::<Article>()
            .fetch_optional(&self.pool)
            .await
    }

    /// create_article
    ///
    /// Inserts the row and its relation rows in one transaction.
    async fn create_article(
        &self,
        draft: ArticleDraft,
        created_by: &str,
    ) -> Result<Article, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles (title, content, published, tags, date, image_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.published)
        .bind(&draft.tags)
        .bind(draft.date)
        .bind(draft.image_id)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_related(&mut tx, id, &draft.related_ids).await?;
        tx.commit().await?;

        self.fetch_article_unscoped(id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// update_article
    ///
    /// `COALESCE` keeps columns whose field was absent. The image needs a flag
    /// because `null` is a meaningful value for it. `created_by` is not touched.
    async fn update_article(
        &self,
        id: i64,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let (image_set, image_id) = match changes.image_id {
            Some(image) => (true, image),
            None => (false, None),
        };

        let updated = sqlx::query(
            r#"
            UPDATE articles
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                published = COALESCE($4, published),
                tags = COALESCE($5, tags),
                date = COALESCE($6, date),
                image_id = CASE WHEN $7 THEN $8 ELSE image_id END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.content)
        .bind(changes.published)
        .bind(&changes.tags)
        .bind(changes.date)
        .bind(image_set)
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(related_ids) = &changes.related_ids {
            Self::replace_related(&mut tx, id, related_ids).await?;
        }
        tx.commit().await?;

        self.fetch_article_unscoped(id).await
    }

    async fn publish_article(&self, id: i64) -> Result<Option<Article>, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE articles SET published = true, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_article_unscoped(id).await
    }

    /// delete_article
    ///
    /// Comments and relation rows go with it through `ON DELETE CASCADE`.
    async fn delete_article(&self, id: i64) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn related_articles(
        &self,
        id: i64,
        scope: &VisibilityScope,
    ) -> Result<Vec<RelatedArticle>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT a.id, a.title
            FROM article_related r
            JOIN articles a ON a.id = r.target_id
            WHERE r.source_id = "#,
        );
        builder.push_bind(id);
        scope.push_predicate(&mut builder, "a");
        builder.push(" ORDER BY a.id ASC");

        builder
            .build_query_as::<RelatedArticle>()
            .fetch_all(&self.pool)
            .await
    }

    async fn existing_article_ids(&self, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        sqlx::query_scalar("SELECT id FROM articles WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
    }

    async fn list_comments(
        &self,
        article_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Comment>, i64), sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE article_id = $1")
            .bind(article_id)
            .fetch_one(&self.pool)
            .await?;

        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, article_id, content, created_by
            FROM comments
            WHERE article_id = $1
            ORDER BY id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(article_id)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((comments, total))
    }

    async fn comments_for_article(&self, article_id: i64) -> Result<Vec<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            "SELECT id, article_id, content, created_by FROM comments WHERE article_id = $1 ORDER BY id ASC",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            "SELECT id, article_id, content, created_by FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_comment(
        &self,
        article_id: i64,
        content: String,
        created_by: &str,
    ) -> Result<Comment, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (article_id, content, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, article_id, content, created_by
            "#,
        )
        .bind(article_id)
        .bind(content)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(missing_reference)
    }

    async fn update_comment(
        &self,
        id: i64,
        content: Option<String>,
        article_id: Option<i64>,
    ) -> Result<Option<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            UPDATE comments
            SET content = COALESCE($2, content),
                article_id = COALESCE($3, article_id)
            WHERE id = $1
            RETURNING id, article_id, content, created_by
            "#,
        )
        .bind(id)
        .bind(content)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(missing_reference)
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_media_object(
        &self,
        file_path: &str,
        content_type: &str,
    ) -> Result<MediaObject, sqlx::Error> {
        sqlx::query_as::<_, MediaObject>(
            r#"
            INSERT INTO media_objects (file_path, content_type)
            VALUES ($1, $2)
            RETURNING id, file_path, content_type
            "#,
        )
        .bind(file_path)
        .bind(content_type)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_media_object(&self, id: i64) -> Result<Option<MediaObject>, sqlx::Error> {
        sqlx::query_as::<_, MediaObject>(
            "SELECT id, file_path, content_type FROM media_objects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}

// A foreign key violation on `comments.article_id` means the article is gone.
fn missing_reference(e: sqlx::Error) -> sqlx::Error {
    let is_fk = e
        .as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation());
    if is_fk { sqlx::Error::RowNotFound } else { e }
}

// --- In-process implementation ---

#[derive(Default)]
struct MemoryStore {
    next_id: i64,
    users: BTreeMap<i64, User>,
    articles: BTreeMap<i64, Article>,
    // source id -> target ids
    related: BTreeMap<i64, Vec<i64>>,
    comments: BTreeMap<i64, Comment>,
    media: BTreeMap<i64, MediaObject>,
}

impl MemoryStore {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    // `comment_count` is derived on read, like the SQL subquery.
    fn hydrate(&self, article: &Article) -> Article {
        let mut article = article.clone();
        article.comment_count = self
            .comments
            .values()
            .filter(|c| c.article_id == article.id)
            .count() as i64;
        article
    }
}

/// MemoryRepository
///
/// A `Repository` held entirely in memory, applying the same `VisibilityScope`
/// and `ArticleFilter` rules as the SQL implementation. Used by the router and
/// handler tests so they run without a database.
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<MemoryStore>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants or revokes admin for a subject, creating the user if needed.
    pub async fn set_admin(&self, clerk_user_id: &str, is_admin: bool) -> User {
        let mut store = self.store.write().await;
        let existing = store
            .users
            .values()
            .find(|u| u.clerk_user_id == clerk_user_id)
            .map(|u| u.id);
        let id = match existing {
            Some(id) => id,
            None => store.next_id(),
        };
        let user = User {
            id,
            clerk_user_id: clerk_user_id.to_string(),
            is_admin,
        };
        store.users.insert(id, user.clone());
        user
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_or_create_user(&self, clerk_user_id: &str) -> Result<User, sqlx::Error> {
        let mut store = self.store.write().await;
        if let Some(user) = store
            .users
            .values()
            .find(|u| u.clerk_user_id == clerk_user_id)
        {
            return Ok(user.clone());
        }
        let id = store.next_id();
        let user = User {
            id,
            clerk_user_id: clerk_user_id.to_string(),
            is_admin: false,
        };
        store.users.insert(id, user.clone());
        Ok(user)
    }

    async fn list_articles(
        &self,
        scope: &VisibilityScope,
        filter: &ArticleFilter,
        page: PageRequest,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let store = self.store.read().await;
        let mut visible: Vec<Article> = store
            .articles
            .values()
            .filter(|a| scope.admits(a.published, &a.created_by))
            .filter(|a| filter.admits(a))
            .map(|a| store.hydrate(a))
            .collect();
        filter.sort(&mut visible);
        let total = visible.len() as i64;
        Ok((page.slice(&visible), total))
    }

    async fn get_article(
        &self,
        id: i64,
        scope: &VisibilityScope,
    ) -> Result<Option<Article>, sqlx::Error> {
        let store = self.store.read().await;
        Ok(store
            .articles
            .get(&id)
            .filter(|a| scope.admits(a.published, &a.created_by))
            .map(|a| store.hydrate(a)))
    }

    async fn create_article(
        &self,
        draft: ArticleDraft,
        created_by: &str,
    ) -> Result<Article, sqlx::Error> {
        let mut store = self.store.write().await;
        let id = store.next_id();
        let now = Utc::now();
        let article = Article {
            id,
            title: draft.title,
            content: draft.content,
            published: draft.published,
            tags: draft.tags,
            date: draft.date,
            image_id: draft.image_id,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            comment_count: 0,
        };
        store.articles.insert(id, article.clone());
        store.related.insert(id, draft.related_ids);
        Ok(article)
    }

    async fn update_article(
        &self,
        id: i64,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, sqlx::Error> {
        let mut store = self.store.write().await;
        let Some(article) = store.articles.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            article.title = title;
        }
        if let Some(content) = changes.content {
            article.content = Some(content);
        }
        if let Some(published) = changes.published {
            article.published = published;
        }
        if let Some(tags) = changes.tags {
            article.tags = tags;
        }
        if let Some(date) = changes.date {
            article.date = date;
        }
        if let Some(image_id) = changes.image_id {
            article.image_id = image_id;
        }
        article.updated_at = Utc::now();
        let article = article.clone();

        if let Some(related_ids) = changes.related_ids {
            store.related.insert(id, related_ids);
        }
        Ok(Some(store.hydrate(&article)))
    }

    async fn publish_article(&self, id: i64) -> Result<Option<Article>, sqlx::Error> {
        let mut store = self.store.write().await;
        let Some(article) = store.articles.get_mut(&id) else {
            return Ok(None);
        };
        article.published = true;
        article.updated_at = Utc::now();
        let article = article.clone();
        Ok(Some(store.hydrate(&article)))
    }

    async fn delete_article(&self, id: i64) -> Result<bool, sqlx::Error> {
        let mut store = self.store.write().await;
        if store.articles.remove(&id).is_none() {
            return Ok(false);
        }
        store.comments.retain(|_, c| c.article_id != id);
        store.related.remove(&id);
        for targets in store.related.values_mut() {
            targets.retain(|t| *t != id);
        }
        Ok(true)
    }

    async fn related_articles(
        &self,
        id: i64,
        scope: &VisibilityScope,
    ) -> Result<Vec<RelatedArticle>, sqlx::Error> {
        let store = self.store.read().await;
        let mut related: Vec<RelatedArticle> = store
            .related
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|target| store.articles.get(target))
            .filter(|a| scope.admits(a.published, &a.created_by))
            .map(|a| RelatedArticle {
                id: a.id,
                title: a.title.clone(),
            })
            .collect();
        related.sort_by_key(|r| r.id);
        Ok(related)
    }

    async fn existing_article_ids(&self, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error> {
        let store = self.store.read().await;
        let mut found: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| store.articles.contains_key(id))
            .collect();
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }

    async fn list_comments(
        &self,
        article_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Comment>, i64), sqlx::Error> {
        let comments = self.comments_for_article(article_id).await?;
        let total = comments.len() as i64;
        Ok((page.slice(&comments), total))
    }

    async fn comments_for_article(&self, article_id: i64) -> Result<Vec<Comment>, sqlx::Error> {
        let store = self.store.read().await;
        Ok(store
            .comments
            .values()
            .filter(|c| c.article_id == article_id)
            .cloned()
            .collect())
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, sqlx::Error> {
        Ok(self.store.read().await.comments.get(&id).cloned())
    }

    async fn create_comment(
        &self,
        article_id: i64,
        content: String,
        created_by: &str,
    ) -> Result<Comment, sqlx::Error> {
        let mut store = self.store.write().await;
        if !store.articles.contains_key(&article_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        let id = store.next_id();
        let comment = Comment {
            id,
            article_id,
            content,
            created_by: created_by.to_string(),
        };
        store.comments.insert(id, comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        id: i64,
        content: Option<String>,
        article_id: Option<i64>,
    ) -> Result<Option<Comment>, sqlx::Error> {
        let mut store = self.store.write().await;
        if !store.comments.contains_key(&id) {
            return Ok(None);
        }
        if article_id.is_some_and(|target| !store.articles.contains_key(&target)) {
            return Err(sqlx::Error::RowNotFound);
        }
        let Some(comment) = store.comments.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(content) = content {
            comment.content = content;
        }
        if let Some(article_id) = article_id {
            comment.article_id = article_id;
        }
        Ok(Some(comment.clone()))
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, sqlx::Error> {
        Ok(self.store.write().await.comments.remove(&id).is_some())
    }

    async fn create_media_object(
        &self,
        file_path: &str,
        content_type: &str,
    ) -> Result<MediaObject, sqlx::Error> {
        let mut store = self.store.write().await;
        let id = store.next_id();
        let media = MediaObject {
            id,
            file_path: file_path.to_string(),
            content_type: content_type.to_string(),
        };
        store.media.insert(id, media.clone());
        Ok(media)
    }

    async fn get_media_object(&self, id: i64) -> Result<Option<MediaObject>, sqlx::Error> {
        Ok(self.store.read().await.media.get(&id).cloned())
    }
}
