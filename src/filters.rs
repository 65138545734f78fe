use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use utoipa::{IntoParams, ToSchema};

use crate::models::Article;

/// SortDirection
///
/// Accepted values for the `order[...]` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// ArticleFilter
///
/// Query parameters accepted by the article listing endpoint (GET /api/articles).
/// Visibility is not part of this struct; it is applied separately from the
/// requester, before these filters and before counting.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArticleFilter {
    /// Partial, case-insensitive match on the title.
    pub title: Option<String>,
    /// Exact match on the published flag.
    pub published: Option<bool>,
    /// Exact match on the article date (YYYY-MM-DD).
    pub date: Option<NaiveDate>,
    /// Free-text search across title and content.
    pub query: Option<String>,
    /// Lower bound (inclusive) on the article id.
    #[serde(rename = "id[gte]")]
    pub id_gte: Option<i64>,
    /// Upper bound (inclusive) on the article id.
    #[serde(rename = "id[lte]")]
    pub id_lte: Option<i64>,
    /// Lower bound (exclusive) on the article id.
    #[serde(rename = "id[gt]")]
    pub id_gt: Option<i64>,
    /// Upper bound (exclusive) on the article id.
    #[serde(rename = "id[lt]")]
    pub id_lt: Option<i64>,
    /// Inclusive id range written `low..high`. Malformed values are ignored.
    #[serde(rename = "id[between]")]
    pub id_between: Option<String>,
    #[serde(rename = "order[id]")]
    pub order_id: Option<SortDirection>,
    #[serde(rename = "order[date]")]
    pub order_date: Option<SortDirection>,
    /// 1-based page number.
    pub page: Option<i64>,
}

impl ArticleFilter {
    /// The free-text query, or `None` when absent or empty (a no-op filter).
    pub fn free_text(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }

    /// The `id[between]` bounds, if well formed.
    pub fn id_between_bounds(&self) -> Option<(i64, i64)> {
        let (low, high) = self.id_between.as_deref()?.split_once("..")?;
        Some((low.trim().parse().ok()?, high.trim().parse().ok()?))
    }

    fn title_fragment(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    /// push_predicates
    ///
    /// Appends the filter clauses to a query whose WHERE clause is already open,
    /// with `alias` naming the articles table. Every user value is bound, never
    /// interpolated.
    pub fn push_predicates(&self, builder: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        if let Some(title) = self.title_fragment() {
            builder.push(format!(" AND {alias}.title ILIKE "));
            builder.push_bind(like_pattern(title));
        }

        if let Some(published) = self.published {
            builder.push(format!(" AND {alias}.published = "));
            builder.push_bind(published);
        }

        if let Some(date) = self.date {
            builder.push(format!(" AND {alias}.date = "));
            builder.push_bind(date);
        }

        if let Some(gte) = self.id_gte {
            builder.push(format!(" AND {alias}.id >= "));
            builder.push_bind(gte);
        }

        if let Some(lte) = self.id_lte {
            builder.push(format!(" AND {alias}.id <= "));
            builder.push_bind(lte);
        }

        if let Some(gt) = self.id_gt {
            builder.push(format!(" AND {alias}.id > "));
            builder.push_bind(gt);
        }

        if let Some(lt) = self.id_lt {
            builder.push(format!(" AND {alias}.id < "));
            builder.push_bind(lt);
        }

        if let Some((low, high)) = self.id_between_bounds() {
            builder.push(format!(" AND {alias}.id BETWEEN "));
            builder.push_bind(low);
            builder.push(" AND ");
            builder.push_bind(high);
        }

        if let Some(query) = self.free_text() {
            let pattern = like_pattern(query);
            builder.push(format!(" AND ({alias}.title ILIKE "));
            builder.push_bind(pattern.clone());
            builder.push(format!(" OR {alias}.content ILIKE "));
            builder.push_bind(pattern);
            builder.push(")");
        }
    }

    /// push_order
    ///
    /// `order[date]` wins over `order[id]`; id is always the final tie-breaker so
    /// pages are stable.
    pub fn push_order(&self, builder: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        builder.push(" ORDER BY ");
        if let Some(direction) = self.order_date {
            builder.push(format!("{alias}.date {}, ", direction.as_sql()));
        }
        let id_direction = self.order_id.unwrap_or(SortDirection::Asc);
        builder.push(format!("{alias}.id {}", id_direction.as_sql()));
    }

    /// admits
    ///
    /// In-process counterpart of `push_predicates`.
    pub fn admits(&self, article: &Article) -> bool {
        if let Some(title) = self.title_fragment() {
            if !contains_ignore_case(&article.title, title) {
                return false;
            }
        }
        if self.published.is_some_and(|p| p != article.published) {
            return false;
        }
        if self.date.is_some_and(|d| d != article.date) {
            return false;
        }
        if self.id_gte.is_some_and(|gte| article.id < gte) {
            return false;
        }
        if self.id_lte.is_some_and(|lte| article.id > lte) {
            return false;
        }
        if self.id_gt.is_some_and(|gt| article.id <= gt) {
            return false;
        }
        if self.id_lt.is_some_and(|lt| article.id >= lt) {
            return false;
        }
        if let Some((low, high)) = self.id_between_bounds() {
            if article.id < low || article.id > high {
                return false;
            }
        }
        match self.free_text() {
            Some(query) => matches_free_text(query, &article.title, article.content.as_deref()),
            None => true,
        }
    }

    /// In-process counterpart of `push_order`.
    pub fn sort(&self, articles: &mut [Article]) {
        let id_direction = self.order_id.unwrap_or(SortDirection::Asc);
        articles.sort_by(|a, b| {
            let by_date = match self.order_date {
                Some(SortDirection::Asc) => a.date.cmp(&b.date),
                Some(SortDirection::Desc) => b.date.cmp(&a.date),
                None => std::cmp::Ordering::Equal,
            };
            by_date.then_with(|| match id_direction {
                SortDirection::Asc => a.id.cmp(&b.id),
                SortDirection::Desc => b.id.cmp(&a.id),
            })
        });
    }
}

/// escape_like
///
/// Escapes the LIKE metacharacters (`\`, `%`, `_`) so user input only ever
/// matches literally. Postgres uses `\` as the default LIKE escape.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn like_pattern(fragment: &str) -> String {
    format!("%{}%", escape_like(fragment))
}

/// matches_free_text
///
/// True when `query` occurs in the title or the content, ignoring case.
pub fn matches_free_text(query: &str, title: &str, content: Option<&str>) -> bool {
    if query.is_empty() {
        return true;
    }
    contains_ignore_case(title, query) || content.is_some_and(|c| contains_ignore_case(c, query))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
