use crate::error::{TimetableResult, Violations, INVALID_DATE_RANGE, OUT_OF_RANGE};
use crate::scope::{text, AccessScope, Predicate};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

/// A period never outlasts a day.
pub const MAX_SCHOOL_HOUR_MINUTES: i64 = 24 * 60;

pub(crate) fn check_school_hour(minutes: i64, violations: &mut Violations) {
    if !(1..=MAX_SCHOOL_HOUR_MINUTES).contains(&minutes) {
        violations.push(
            "schoolHourMinutes",
            OUT_OF_RANGE,
            format!("schoolHourMinutes must be between 1 and {MAX_SCHOOL_HOUR_MINUTES}"),
        );
    }
}

/// Per-schedule settings. Every schedule has exactly one row, created with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSettings {
    pub id: String,
    pub schedule_id: String,
    pub school_hour_minutes: i64,
    pub school_year_start: NaiveDate,
    pub school_year_end: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub school_hour_minutes: Option<i64>,
    pub school_year_start: Option<NaiveDate>,
    pub school_year_end: Option<NaiveDate>,
}

/// Looks up the settings of a schedule visible to `scope`.
pub fn resolve(
    conn: &Connection,
    schedule_id: &str,
    scope: &AccessScope,
) -> TimetableResult<Option<ScheduleSettings>> {
    let pred = Predicate::new()
        .and("ss.schedule_id = ?", [text(schedule_id)])
        .scoped(scope, "s");
    let sql = format!(
        "SELECT ss.id, ss.schedule_id, ss.school_hour_minutes, ss.school_year_start, ss.school_year_end
         FROM schedule_settings ss
         JOIN schedules s ON s.id = ss.schedule_id
         {}",
        pred.where_clause()
    );
    let row = conn
        .query_row(&sql, params_from_iter(pred.params()), |r| {
            Ok(ScheduleSettings {
                id: r.get(0)?,
                schedule_id: r.get(1)?,
                school_hour_minutes: r.get(2)?,
                school_year_start: r.get(3)?,
                school_year_end: r.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

/// Partial update; omitted fields keep their stored values and the merged
/// result must still be consistent.
pub fn update(
    conn: &Connection,
    schedule_id: &str,
    patch: SettingsPatch,
    scope: &AccessScope,
) -> TimetableResult<Option<ScheduleSettings>> {
    let Some(mut current) = resolve(conn, schedule_id, scope)? else {
        return Ok(None);
    };

    if let Some(m) = patch.school_hour_minutes {
        current.school_hour_minutes = m;
    }
    if let Some(d) = patch.school_year_start {
        current.school_year_start = d;
    }
    if let Some(d) = patch.school_year_end {
        current.school_year_end = d;
    }

    let mut violations = Violations::new();
    check_school_hour(current.school_hour_minutes, &mut violations);
    if current.school_year_start > current.school_year_end {
        violations.push(
            "schoolYearEnd",
            INVALID_DATE_RANGE,
            "schoolYearStart must not be after schoolYearEnd",
        );
    }
    violations.into_result()?;

    conn.execute(
        "UPDATE schedule_settings
         SET school_hour_minutes = ?, school_year_start = ?, school_year_end = ?
         WHERE id = ?",
        params![
            current.school_hour_minutes,
            current.school_year_start,
            current.school_year_end,
            current.id
        ],
    )?;
    info!(schedule_id = %current.schedule_id, "schedule settings updated");
    Ok(Some(current))
}
