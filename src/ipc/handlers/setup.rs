use crate::blocks::DEFAULT_MAX_OCCURRENCES;
use crate::db;
use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, respond, Reply};
use crate::ipc::types::{AppState, Request};
use crate::paging::PageLimits;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::info;

const TIMETABLE_KEY: &str = "setup.timetable";

/// Workspace-wide knobs, persisted as one JSON object in `settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimetableSetup {
    pub default_school_hour_minutes: i64,
    pub max_recurrence_weeks: i64,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for TimetableSetup {
    fn default() -> Self {
        let limits = PageLimits::default();
        Self {
            default_school_hour_minutes: 45,
            max_recurrence_weeks: DEFAULT_MAX_OCCURRENCES as i64,
            default_page_size: limits.default_page_size,
            max_page_size: limits.max_page_size,
        }
    }
}

impl TimetableSetup {
    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }

    pub fn max_occurrences(&self) -> usize {
        self.max_recurrence_weeks.max(1) as usize
    }

    fn to_json(self) -> Value {
        json!({
            "defaultSchoolHourMinutes": self.default_school_hour_minutes,
            "maxRecurrenceWeeks": self.max_recurrence_weeks,
            "defaultPageSize": self.default_page_size,
            "maxPageSize": self.max_page_size
        })
    }

    /// Stored values that are missing or malformed fall back to defaults.
    fn from_json(v: &Value) -> Self {
        let d = Self::default();
        let int = |key: &str, fallback: i64| v.get(key).and_then(|x| x.as_i64()).unwrap_or(fallback);
        Self {
            default_school_hour_minutes: int("defaultSchoolHourMinutes", d.default_school_hour_minutes),
            max_recurrence_weeks: int("maxRecurrenceWeeks", d.max_recurrence_weeks),
            default_page_size: int("defaultPageSize", d.default_page_size),
            max_page_size: int("maxPageSize", d.max_page_size),
        }
    }
}

pub fn load_timetable_setup(conn: &Connection) -> anyhow::Result<TimetableSetup> {
    Ok(db::settings_get_json(conn, TIMETABLE_KEY)?
        .map(|v| TimetableSetup::from_json(&v))
        .unwrap_or_default())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_timetable_patch(current: &mut TimetableSetup, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "defaultSchoolHourMinutes" => current.default_school_hour_minutes = parse_i64_range(v, k, 1, 240)?,
            "maxRecurrenceWeeks" => current.max_recurrence_weeks = parse_i64_range(v, k, 1, 104)?,
            "defaultPageSize" => current.default_page_size = parse_i64_range(v, k, 1, 500)?,
            "maxPageSize" => current.max_page_size = parse_i64_range(v, k, 1, 1000)?,
            _ => return Err(format!("unknown timetable field: {}", k)),
        }
    }
    if current.default_page_size > current.max_page_size {
        return Err("defaultPageSize must be <= maxPageSize".into());
    }
    Ok(())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let timetable = load_timetable_setup(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    Ok(json!({ "timetable": timetable.to_json() }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", "missing section", None));
    };
    if section != "timetable" {
        return Err(err(&req.id, "bad_params", "unknown section", None));
    }
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "patch must be an object", None));
    };

    let mut current = load_timetable_setup(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    merge_timetable_patch(&mut current, patch_obj).map_err(|msg| err(&req.id, "bad_params", msg, None))?;
    db::settings_set_json(conn, TIMETABLE_KEY, &current.to_json())
        .map_err(|e| err(&req.id, "db_update_failed", e.to_string(), None))?;
    info!(?current, "timetable setup updated");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let reply = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(req, reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_validates_ranges_and_page_ordering() {
        let mut s = TimetableSetup::default();
        let patch = json!({ "maxRecurrenceWeeks": 10, "defaultPageSize": 20 });
        merge_timetable_patch(&mut s, patch.as_object().unwrap()).unwrap();
        assert_eq!(s.max_occurrences(), 10);
        assert_eq!(s.page_limits().default_page_size, 20);

        let too_big = json!({ "maxRecurrenceWeeks": 105 });
        assert!(merge_timetable_patch(&mut s, too_big.as_object().unwrap()).is_err());
        let inverted = json!({ "maxPageSize": 10 });
        assert!(merge_timetable_patch(&mut s.clone(), inverted.as_object().unwrap()).is_err());
        let unknown = json!({ "colour": "red" });
        assert!(merge_timetable_patch(&mut s, unknown.as_object().unwrap()).is_err());
    }

    #[test]
    fn stored_json_falls_back_per_field() {
        let s = TimetableSetup::from_json(&json!({ "maxPageSize": 300, "defaultPageSize": "x" }));
        assert_eq!(s.max_page_size, 300);
        assert_eq!(s.default_page_size, 50);
        assert_eq!(TimetableSetup::from_json(&s.to_json()), s);
    }
}
