//! Role-based visibility.
//!
//! `Admin` sees every schedule. Any other role only sees what hangs off the
//! schedules it owns. Queries never branch on the role themselves; they ask
//! the scope for a predicate against the schedule row they join and AND it in.
//! A resource hidden by the scope is reported exactly like a missing one.

use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Member
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessScope {
    user_id: String,
    role: Role,
}

impl AccessScope {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A conjunction of SQL conditions with their bound parameters.
///
/// Clause text is always a crate-owned literal; caller-provided values only
/// ever travel as parameters.
#[derive(Debug, Default, Clone)]
pub struct Predicate {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and<I>(mut self, clause: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.clauses.push(clause.into());
        self.params.extend(params);
        self
    }

    /// Restricts rows to schedules visible to `scope`. `schedule_alias` names
    /// the joined `schedules` row in the surrounding query.
    pub fn scoped(self, scope: &AccessScope, schedule_alias: &'static str) -> Self {
        if scope.is_admin() {
            return self;
        }
        self.and(
            format!("{schedule_alias}.owner_id = ?"),
            [Value::Text(scope.user_id().to_string())],
        )
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

pub fn text(v: &str) -> Value {
    Value::Text(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_scope_adds_nothing() {
        let scope = AccessScope::new("root", Role::Admin);
        let p = Predicate::new()
            .and("b.lesson_id = ?", [text("L1")])
            .scoped(&scope, "s");
        assert_eq!(p.where_clause(), "WHERE b.lesson_id = ?");
        assert_eq!(p.params().len(), 1);
    }

    #[test]
    fn member_scope_filters_by_owner() {
        let scope = AccessScope::new("u-7", Role::parse("teacher"));
        let p = Predicate::new().scoped(&scope, "s");
        assert_eq!(p.where_clause(), "WHERE s.owner_id = ?");
        assert_eq!(p.into_params(), vec![Value::Text("u-7".into())]);
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse(" admin "), Role::Admin);
        assert_eq!(Role::parse("student"), Role::Member);
    }
}
