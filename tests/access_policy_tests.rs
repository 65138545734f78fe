use blog_api::{
    access::{Requester, VisibilityScope, authorize_edit},
    errors::ApiError,
    filters::{ArticleFilter, SortDirection, escape_like, matches_free_text},
};
use axum::{extract::Query, http::Uri};
use sqlx::{Postgres, QueryBuilder};

#[cfg(test)]
mod visibility_tests {
    use super::*;

    #[test]
    fn test_requester_scopes() {
        assert_eq!(
            Requester::Anonymous.visibility(),
            VisibilityScope::PublishedOnly
        );
        assert_eq!(
            Requester::User("user_a".into()).visibility(),
            VisibilityScope::PublishedOrOwnedBy("user_a".into())
        );
        assert_eq!(
            Requester::Admin("admin".into()).visibility(),
            VisibilityScope::Everything
        );
    }

    #[test]
    fn test_anonymous_sees_only_published() {
        let scope = Requester::Anonymous.visibility();
        assert!(scope.admits(true, "user_a"));
        assert!(!scope.admits(false, "user_a"));
    }

    #[test]
    fn test_user_sees_published_and_own_drafts() {
        let scope = Requester::User("user_a".into()).visibility();
        assert!(scope.admits(true, "user_b"));
        assert!(scope.admits(false, "user_a"));
        assert!(!scope.admits(false, "user_b"));
    }

    #[test]
    fn test_admin_sees_everything() {
        let scope = Requester::Admin("admin".into()).visibility();
        assert!(scope.admits(false, "user_b"));
        assert!(scope.admits(true, "user_b"));
    }

    #[test]
    fn test_identity() {
        assert_eq!(Requester::Anonymous.identity(), None);
        assert_eq!(Requester::User("u".into()).identity(), Some("u"));
        assert_eq!(Requester::Admin("a".into()).identity(), Some("a"));
        assert!(Requester::Admin("a".into()).is_admin());
        assert!(!Requester::User("u".into()).is_admin());
    }

    #[test]
    fn test_scope_sql_predicates() {
        let mut everything: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM articles a WHERE TRUE");
        VisibilityScope::Everything.push_predicate(&mut everything, "a");
        assert_eq!(everything.sql(), "SELECT * FROM articles a WHERE TRUE");

        let mut published: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM articles a WHERE TRUE");
        VisibilityScope::PublishedOnly.push_predicate(&mut published, "a");
        assert_eq!(
            published.sql(),
            "SELECT * FROM articles a WHERE TRUE AND a.published = true"
        );

        let mut owned: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM articles a WHERE TRUE");
        VisibilityScope::PublishedOrOwnedBy("user_a".into()).push_predicate(&mut owned, "a");
        assert_eq!(
            owned.sql(),
            "SELECT * FROM articles a WHERE TRUE AND (a.published = true OR a.created_by = $1)"
        );
    }
}

#[cfg(test)]
mod edit_authorization_tests {
    use super::*;

    #[test]
    fn test_anonymous_is_unauthorized() {
        let result = authorize_edit(&Requester::Anonymous, "user_a");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_owner_may_edit() {
        assert!(authorize_edit(&Requester::User("user_a".into()), "user_a").is_ok());
    }

    #[test]
    fn test_other_user_is_forbidden() {
        let result = authorize_edit(&Requester::User("user_b".into()), "user_a");
        assert!(matches!(result, Err(ApiError::Forbidden)));
    }

    #[test]
    fn test_admin_may_edit_anything() {
        assert!(authorize_edit(&Requester::Admin("admin".into()), "user_a").is_ok());
    }
}

#[cfg(test)]
mod search_filter_tests {
    use super::*;

    #[test]
    fn test_escape_like_metacharacters() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("snake_case"), "snake\\_case");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_free_text_matches_title_or_content() {
        assert!(matches_free_text("rust", "Learning Rust", None));
        assert!(matches_free_text("borrow", "Title", Some("The BORROW checker")));
        assert!(!matches_free_text("python", "Learning Rust", Some("nothing")));
    }

    #[test]
    fn test_empty_query_is_a_no_op() {
        assert!(matches_free_text("", "anything", None));

        let filter = ArticleFilter {
            query: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(filter.free_text(), None);
    }

    #[test]
    fn test_percent_matches_literally() {
        assert!(!matches_free_text("%", "no percent here", None));
        assert!(matches_free_text("%", "100% sure", None));
    }

    #[test]
    fn test_filter_sql_binds_user_input() {
        let filter = ArticleFilter {
            title: Some("rust".into()),
            published: Some(true),
            query: Some("tokio".into()),
            ..Default::default()
        };

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM articles a WHERE TRUE");
        filter.push_predicates(&mut builder, "a");
        filter.push_order(&mut builder, "a");

        assert_eq!(
            builder.sql(),
            "SELECT * FROM articles a WHERE TRUE AND a.title ILIKE $1 AND a.published = $2 \
             AND (a.title ILIKE $3 OR a.content ILIKE $4) ORDER BY a.id ASC"
        );
    }

    #[test]
    fn test_id_range_sql() {
        let filter = ArticleFilter {
            id_gt: Some(3),
            id_lt: Some(40),
            id_between: Some("5..30".into()),
            ..Default::default()
        };

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM articles a WHERE TRUE");
        filter.push_predicates(&mut builder, "a");

        assert_eq!(
            builder.sql(),
            "SELECT * FROM articles a WHERE TRUE AND a.id > $1 AND a.id < $2 \
             AND a.id BETWEEN $3 AND $4"
        );
    }

    #[test]
    fn test_id_between_parsing() {
        let parse = |raw: &str| ArticleFilter {
            id_between: Some(raw.into()),
            ..Default::default()
        };
        assert_eq!(parse("2..9").id_between_bounds(), Some((2, 9)));
        assert_eq!(parse(" 2 .. 9 ").id_between_bounds(), Some((2, 9)));
        assert_eq!(parse("2-9").id_between_bounds(), None);
        assert_eq!(parse("x..9").id_between_bounds(), None);
    }

    #[test]
    fn test_order_by_date_then_id() {
        let filter = ArticleFilter {
            order_date: Some(SortDirection::Desc),
            order_id: Some(SortDirection::Desc),
            ..Default::default()
        };

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1");
        filter.push_order(&mut builder, "a");
        assert_eq!(builder.sql(), "SELECT 1 ORDER BY a.date DESC, a.id DESC");
    }

    #[test]
    fn test_bracketed_query_keys_deserialize() {
        let uri: Uri = "/api/articles?id%5Bgte%5D=2&id%5Blte%5D=9&id%5Bgt%5D=1&id%5Blt%5D=10\
                        &id%5Bbetween%5D=3..8&order%5Bdate%5D=asc&page=3"
            .parse()
            .unwrap();
        let Query(filter) = Query::<ArticleFilter>::try_from_uri(&uri).unwrap();

        assert_eq!(filter.id_gte, Some(2));
        assert_eq!(filter.id_lte, Some(9));
        assert_eq!(filter.id_gt, Some(1));
        assert_eq!(filter.id_lt, Some(10));
        assert_eq!(filter.id_between_bounds(), Some((3, 8)));
        assert_eq!(filter.order_date, Some(SortDirection::Asc));
        assert_eq!(filter.page, Some(3));
    }
}
