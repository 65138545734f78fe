use sqlx::{Postgres, QueryBuilder};

use crate::errors::ApiError;

/// Requester
///
/// The identity a request acts as, resolved once by the `Requester` extractor
/// (see `auth.rs`) and handed explicitly to the rules below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    Anonymous,
    /// A signed-in, non-admin user, identified by the external subject (`clerk_user_id`).
    User(String),
    /// A signed-in admin. The subject is kept so admins still own what they create.
    Admin(String),
}

impl Requester {
    /// The external identity stamped into `created_by`, if any.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Requester::Anonymous => None,
            Requester::User(id) | Requester::Admin(id) => Some(id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Requester::Admin(_))
    }

    /// visibility
    ///
    /// The row filter this requester reads through.
    pub fn visibility(&self) -> VisibilityScope {
        match self {
            Requester::Admin(_) => VisibilityScope::Everything,
            Requester::Anonymous => VisibilityScope::PublishedOnly,
            Requester::User(id) => VisibilityScope::PublishedOrOwnedBy(id.clone()),
        }
    }
}

/// VisibilityScope
///
/// The read filter for articles (and comments, through their parent article).
/// The same scope drives the SQL predicate in `PostgresRepository` and the
/// in-process check in `MemoryRepository`, so both backends agree row for row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityScope {
    Everything,
    PublishedOnly,
    PublishedOrOwnedBy(String),
}

impl VisibilityScope {
    /// admits
    ///
    /// Whether a row with these attributes is visible under this scope.
    pub fn admits(&self, published: bool, created_by: &str) -> bool {
        match self {
            VisibilityScope::Everything => true,
            VisibilityScope::PublishedOnly => published,
            VisibilityScope::PublishedOrOwnedBy(owner) => published || owner == created_by,
        }
    }

    /// push_predicate
    ///
    /// Appends the scope as an `AND ...` clause to a query whose WHERE clause is
    /// already open. `alias` is the articles table alias.
    pub fn push_predicate(&self, builder: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        match self {
            VisibilityScope::Everything => {}
            VisibilityScope::PublishedOnly => {
                builder.push(format!(" AND {alias}.published = true"));
            }
            VisibilityScope::PublishedOrOwnedBy(owner) => {
                builder.push(format!(
                    " AND ({alias}.published = true OR {alias}.created_by = "
                ));
                builder.push_bind(owner.clone());
                builder.push(")");
            }
        }
    }
}

/// authorize_edit
///
/// Mutation rule shared by articles and comments: admins and the creator may
/// edit. Anonymous requesters get 401, everyone else 403. Callers run the
/// visibility lookup first so a hidden row has already become a 404.
pub fn authorize_edit(requester: &Requester, created_by: &str) -> Result<(), ApiError> {
    match requester {
        Requester::Anonymous => Err(ApiError::Unauthorized),
        Requester::Admin(_) => Ok(()),
        Requester::User(id) if id == created_by => Ok(()),
        Requester::User(_) => Err(ApiError::Forbidden),
    }
}
