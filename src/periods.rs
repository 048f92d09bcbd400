//! The ordered catalog of daily lesson periods of one schedule.
//!
//! Lesson blocks address periods by their index in start order, so the
//! catalog is always read in `start, id` order when positions matter.

use crate::error::{FieldError, TimetableError, TimetableResult, Violations, INVALID_DATE_RANGE, OUT_OF_RANGE};
use crate::guard::{self, TimeWindow};
use crate::paging::{Page, PageLimits, PageParams, PageRequest, SortField, SortSpec};
use crate::scope::{text, AccessScope, Predicate};
use crate::settings;
use chrono::{Duration, NaiveTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const PERIOD_SORT: SortSpec = SortSpec {
    fields: &[
        SortField { name: "Id", column: "p.id" },
        SortField { name: "Start", column: "p.start" },
        SortField { name: "Finish", column: "p.finish" },
    ],
    default_field: "Start",
    tiebreak: "p.id",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPeriod {
    pub id: String,
    pub settings_id: String,
    pub schedule_id: String,
    #[serde(serialize_with = "hh_mm")]
    pub start: NaiveTime,
    #[serde(serialize_with = "hh_mm")]
    pub finish: NaiveTime,
}

impl LessonPeriod {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.finish)
    }

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(LessonPeriod {
            id: r.get(0)?,
            settings_id: r.get(1)?,
            schedule_id: r.get(2)?,
            start: r.get(3)?,
            finish: r.get(4)?,
        })
    }
}

fn hh_mm<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.format("%H:%M").to_string())
}

#[derive(Debug, Clone, Default)]
pub struct PeriodPatch {
    pub start: Option<NaiveTime>,
    pub finish: Option<NaiveTime>,
}

const PERIOD_COLUMNS: &str = "p.id, p.settings_id, ss.schedule_id, p.start, p.finish";

/// Every period of a settings scope, unpaginated.
pub fn sibling_periods(conn: &Connection, settings_id: &str) -> TimetableResult<Vec<LessonPeriod>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERIOD_COLUMNS}
         FROM lesson_periods p
         JOIN schedule_settings ss ON ss.id = p.settings_id
         WHERE p.settings_id = ?
         ORDER BY p.start, p.id"
    ))?;
    let rows = stmt
        .query_map([settings_id], LessonPeriod::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of periods defined for a schedule; valid block indices are `0..count`.
pub fn period_count(conn: &Connection, schedule_id: &str) -> TimetableResult<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*)
         FROM lesson_periods p
         JOIN schedule_settings ss ON ss.id = p.settings_id
         WHERE ss.schedule_id = ?",
        [schedule_id],
        |r| r.get(0),
    )?;
    Ok(n)
}

pub fn find(conn: &Connection, period_id: &str, scope: &AccessScope) -> TimetableResult<Option<LessonPeriod>> {
    let pred = Predicate::new()
        .and("p.id = ?", [text(period_id)])
        .scoped(scope, "s");
    let sql = format!(
        "SELECT {PERIOD_COLUMNS}
         FROM lesson_periods p
         JOIN schedule_settings ss ON ss.id = p.settings_id
         JOIN schedules s ON s.id = ss.schedule_id
         {}",
        pred.where_clause()
    );
    let row = conn
        .query_row(&sql, params_from_iter(pred.params()), LessonPeriod::from_row)
        .optional()?;
    Ok(row)
}

/// Adds a period to the schedule's catalog. Without an explicit `finish` the
/// period lasts one school hour.
pub fn create(
    conn: &Connection,
    schedule_id: &str,
    start: NaiveTime,
    finish: Option<NaiveTime>,
    scope: &AccessScope,
) -> TimetableResult<LessonPeriod> {
    let settings = settings::resolve(conn, schedule_id, scope)?
        .ok_or_else(|| TimetableError::not_found("ScheduleSettings"))?;

    let finish = match finish {
        Some(f) if f < start => {
            return Err(TimetableError::invalid_range("finish"));
        }
        Some(f) => f,
        None => {
            let end = Duration::try_minutes(settings.school_hour_minutes)
                .map(|d| start.overflowing_add_signed(d))
                .filter(|&(_, wrapped)| wrapped == 0);
            match end {
                Some((f, _)) => f,
                None => {
                    return Err(TimetableError::Validation(vec![FieldError::new(
                        "start",
                        OUT_OF_RANGE,
                        "period would end after midnight",
                    )]));
                }
            }
        }
    };

    let siblings = sibling_periods(conn, &settings.id)?;
    if let Err(e) = guard::ensure_spaced(
        start,
        siblings.iter().map(|p| p.start),
        settings.school_hour_minutes,
    ) {
        warn!(schedule_id, start = %start, "period rejected by guard band");
        return Err(e);
    }

    let period = LessonPeriod {
        id: Uuid::new_v4().to_string(),
        settings_id: settings.id,
        schedule_id: settings.schedule_id,
        start,
        finish,
    };
    conn.execute(
        "INSERT INTO lesson_periods(id, settings_id, start, finish) VALUES(?, ?, ?, ?)",
        params![period.id, period.settings_id, period.start, period.finish],
    )?;
    info!(period_id = %period.id, schedule_id = %period.schedule_id, "lesson period created");
    Ok(period)
}

/// Returns `None` when the period is missing or hidden from `scope`.
pub fn update(
    conn: &Connection,
    period_id: &str,
    patch: PeriodPatch,
    scope: &AccessScope,
) -> TimetableResult<Option<LessonPeriod>> {
    let Some(mut period) = find(conn, period_id, scope)? else {
        return Ok(None);
    };
    if let Some(s) = patch.start {
        period.start = s;
    }
    if let Some(f) = patch.finish {
        period.finish = f;
    }

    let others: Vec<TimeWindow> = sibling_periods(conn, &period.settings_id)?
        .into_iter()
        .filter(|p| p.id != period.id)
        .map(|p| p.window())
        .collect();
    if let Err(e) = guard::ensure_no_overlap(period.window(), others) {
        warn!(period_id, error = %e, "period update rejected");
        return Err(e);
    }

    conn.execute(
        "UPDATE lesson_periods SET start = ?, finish = ? WHERE id = ?",
        params![period.start, period.finish, period.id],
    )?;
    info!(period_id = %period.id, "lesson period updated");
    Ok(Some(period))
}

/// Blocks that index past the end of a shrunk catalog are left as they are.
pub fn delete(conn: &Connection, period_id: &str, scope: &AccessScope) -> TimetableResult<bool> {
    let Some(period) = find(conn, period_id, scope)? else {
        return Ok(false);
    };
    conn.execute("DELETE FROM lesson_periods WHERE id = ?", [&period.id])?;
    info!(period_id = %period.id, "lesson period deleted");
    Ok(true)
}

pub fn list(
    conn: &Connection,
    schedule_id: &str,
    paging: &PageParams,
    limits: PageLimits,
    scope: &AccessScope,
) -> TimetableResult<Option<Page<LessonPeriod>>> {
    let mut violations = Violations::new();
    let page = PageRequest::resolve(paging, &PERIOD_SORT, limits, &mut violations);
    violations.into_result()?;

    let Some(settings) = settings::resolve(conn, schedule_id, scope)? else {
        return Ok(None);
    };

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM lesson_periods WHERE settings_id = ?",
        [&settings.id],
        |r| r.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERIOD_COLUMNS}
         FROM lesson_periods p
         JOIN schedule_settings ss ON ss.id = p.settings_id
         WHERE p.settings_id = ?
         {}
         LIMIT ? OFFSET ?",
        page.order_by()
    ))?;
    let args = [
        Value::Text(settings.id.clone()),
        Value::Integer(page.page_size),
        Value::Integer(page.offset()),
    ];
    let items = stmt
        .query_map(params_from_iter(args.iter()), LessonPeriod::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    debug!(schedule_id, total, returned = items.len(), "periods listed");

    Ok(Some(Page {
        items,
        page: page.page,
        page_size: page.page_size,
        total,
    }))
}
