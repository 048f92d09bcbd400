use crate::error::TimetableError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scope::{AccessScope, Role};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// `Ok` carries the result payload, `Err` a finished error response.
pub type Reply = Result<Value, Value>;

pub fn respond(req: &Request, reply: Reply) -> Value {
    match reply {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn caller_scope(req: &Request) -> Result<AccessScope, Value> {
    match &req.caller {
        Some(c) if !c.user_id.trim().is_empty() => {
            Ok(AccessScope::new(c.user_id.trim(), Role::parse(&c.role)))
        }
        _ => Err(err(&req.id, "unauthorized", "missing caller", None)),
    }
}

pub fn parse_params<T: DeserializeOwned>(req: &Request) -> Result<T, Value> {
    let params = if req.params.is_null() {
        json!({})
    } else {
        req.params.clone()
    };
    serde_json::from_value(params).map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

pub fn parse_date(req: &Request, field: &str, raw: &str) -> Result<NaiveDate, Value> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        err(
            &req.id,
            "bad_params",
            format!("{field} must be a YYYY-MM-DD date"),
            Some(json!({ "errors": [{ "field": field, "code": "invalid_value", "message": "expected YYYY-MM-DD" }] })),
        )
    })
}

pub fn parse_opt_date(req: &Request, field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, Value> {
    raw.map(|s| parse_date(req, field, s)).transpose()
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(req: &Request, field: &str, raw: &str) -> Result<NaiveTime, Value> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| {
            err(
                &req.id,
                "bad_params",
                format!("{field} must be a HH:MM time"),
                Some(json!({ "errors": [{ "field": field, "code": "invalid_value", "message": "expected HH:MM" }] })),
            )
        })
}

pub fn to_value<T: Serialize>(req: &Request, value: &T) -> Reply {
    serde_json::to_value(value).map_err(|e| err(&req.id, "internal", e.to_string(), None))
}

pub fn absent(req: &Request, what: &str) -> Value {
    err(&req.id, "not_found", format!("{what} not found"), None)
}

pub fn core_err(req: &Request, e: TimetableError) -> Value {
    match e {
        TimetableError::Validation(errors) => {
            warn!(method = %req.method, violations = errors.len(), "request rejected");
            let message = summary(&errors);
            err(&req.id, "bad_params", message, Some(json!({ "errors": errors })))
        }
        TimetableError::TimeOverlap { resource } => {
            let details = resource.as_ref().map(|r| json!({ "resource": r }));
            err(&req.id, "time_overlap", "time overlap", details)
        }
        TimetableError::NotFound(what) => absent(req, &what),
        TimetableError::NameTaken { entity, name } => err(
            &req.id,
            "name_taken",
            format!("{entity} named '{name}' already exists"),
            Some(json!({ "entity": entity })),
        ),
        TimetableError::Storage(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn summary(errors: &[crate::error::FieldError]) -> String {
    match errors {
        [one] => one.message.clone(),
        _ => format!("{} validation errors", errors.len()),
    }
}

/// Distinguishes an explicit `null` (clear) from an omitted field.
pub fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}
