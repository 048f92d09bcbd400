use serde::Serialize;

pub type TimetableResult<T> = Result<T, TimetableError>;

/// One field-level problem found while validating a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("time overlap{}", resource_suffix(.resource))]
    TimeOverlap { resource: Option<String> },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{entity} named '{name}' already exists")]
    NameTaken { entity: &'static str, name: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl TimetableError {
    pub fn overlap(resource: &str) -> Self {
        TimetableError::TimeOverlap {
            resource: Some(resource.to_string()),
        }
    }

    pub fn not_found(what: &str) -> Self {
        TimetableError::NotFound(what.to_string())
    }

    pub fn invalid_range(field: &str) -> Self {
        TimetableError::Validation(vec![FieldError::new(
            field,
            INVALID_DATE_RANGE,
            "start must not be after end",
        )])
    }
}

fn resource_suffix(resource: &Option<String>) -> String {
    match resource {
        Some(r) => format!(" ({r})"),
        None => String::new(),
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub const INVALID_DATE_RANGE: &str = "invalid_date_range";
pub const INVALID_PERIOD_SPAN: &str = "invalid_period_span";
pub const OUT_OF_RANGE: &str = "out_of_range";
pub const INVALID_VALUE: &str = "invalid_value";
pub const REQUIRED: &str = "required";

/// Accumulates field errors so a request reports every violation at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldError>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, code: &'static str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, code, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> TimetableResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(TimetableError::Validation(self.0))
        }
    }
}
