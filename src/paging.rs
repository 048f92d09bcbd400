use crate::error::{Violations, INVALID_VALUE, OUT_OF_RANGE};
use serde::{Deserialize, Serialize};

/// Sortable field exposed to clients, mapped to a fixed column.
#[derive(Debug, Clone, Copy)]
pub struct SortField {
    pub name: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub fields: &'static [SortField],
    pub default_field: &'static str,
    /// Appended after the chosen column so page boundaries are stable.
    pub tiebreak: &'static str,
}

impl SortSpec {
    fn lookup(&self, name: &str) -> Option<SortField> {
        self.fields
            .iter()
            .copied()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_desc: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    pub sort_field: &'static str,
    sort_column: &'static str,
    tiebreak: &'static str,
    pub descending: bool,
}

impl PageRequest {
    /// Validates client paging against `spec`. Problems are pushed into
    /// `violations`; the returned request falls back to defaults for any
    /// rejected part so validation of the rest of the request can continue.
    pub fn resolve(
        params: &PageParams,
        spec: &SortSpec,
        limits: PageLimits,
        violations: &mut Violations,
    ) -> PageRequest {
        let page = match params.page {
            Some(p) if p < 1 => {
                violations.push("paging.page", OUT_OF_RANGE, "page must be >= 1");
                1
            }
            Some(p) => p,
            None => 1,
        };
        let page_size = match params.page_size {
            Some(s) if s < 1 || s > limits.max_page_size => {
                violations.push(
                    "paging.pageSize",
                    OUT_OF_RANGE,
                    format!("pageSize must be in 1..={}", limits.max_page_size),
                );
                limits.default_page_size
            }
            Some(s) => s,
            None => limits.default_page_size,
        };
        let fallback = spec
            .lookup(spec.default_field)
            .unwrap_or(spec.fields[0]);
        let field = match params.sort_by.as_deref().map(str::trim) {
            None | Some("") => fallback,
            Some(name) => match spec.lookup(name) {
                Some(f) => f,
                None => {
                    let allowed: Vec<&str> = spec.fields.iter().map(|f| f.name).collect();
                    violations.push(
                        "paging.sortBy",
                        INVALID_VALUE,
                        format!("sortBy must be one of: {}", allowed.join(", ")),
                    );
                    fallback
                }
            },
        };

        PageRequest {
            page,
            page_size,
            sort_field: field.name,
            sort_column: field.column,
            tiebreak: spec.tiebreak,
            descending: params.sort_desc.unwrap_or(false),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn order_by(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("ORDER BY {} {}, {}", self.sort_column, dir, self.tiebreak)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORT: SortSpec = SortSpec {
        fields: &[
            SortField { name: "Id", column: "x.id" },
            SortField { name: "LessonDate", column: "x.lesson_date" },
        ],
        default_field: "LessonDate",
        tiebreak: "x.id",
    };

    #[test]
    fn defaults_apply_when_nothing_given() {
        let mut v = Violations::new();
        let req = PageRequest::resolve(&PageParams::default(), &SORT, PageLimits::default(), &mut v);
        assert!(v.is_empty());
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 50);
        assert_eq!(req.offset(), 0);
        assert_eq!(req.order_by(), "ORDER BY x.lesson_date ASC, x.id");
    }

    #[test]
    fn sort_field_matches_allow_list_case_insensitively() {
        let mut v = Violations::new();
        let params = PageParams {
            page: Some(3),
            page_size: Some(10),
            sort_by: Some("id".into()),
            sort_desc: Some(true),
        };
        let req = PageRequest::resolve(&params, &SORT, PageLimits::default(), &mut v);
        assert!(v.is_empty());
        assert_eq!(req.sort_field, "Id");
        assert_eq!(req.offset(), 20);
        assert_eq!(req.order_by(), "ORDER BY x.id DESC, x.id");
    }

    #[test]
    fn every_paging_problem_is_reported() {
        let mut v = Violations::new();
        let params = PageParams {
            page: Some(0),
            page_size: Some(10_000),
            sort_by: Some("lesson_date; DROP TABLE x".into()),
            sort_desc: None,
        };
        let req = PageRequest::resolve(&params, &SORT, PageLimits::default(), &mut v);
        assert_eq!(req.order_by(), "ORDER BY x.lesson_date ASC, x.id");
        match v.into_result() {
            Err(crate::error::TimetableError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["paging.page", "paging.pageSize", "paging.sortBy"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
