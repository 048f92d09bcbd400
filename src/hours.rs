//! Derived "hours already scheduled" per lesson.
//!
//! `lessons.current_hours` always equals the sum of `lesson_end - lesson_start + 1`
//! over the blocks currently referencing the lesson. Nothing adjusts it
//! incrementally: every block mutation ends by recomputing it from scratch
//! inside the same transaction.

use crate::error::{TimetableError, TimetableResult};
use crate::lessons;
use crate::scope::AccessScope;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursSnapshot {
    pub lesson_id: String,
    pub amount_of_hours: i64,
    pub current_hours: i64,
}

/// Sum of period spans over every block of the lesson, 0 when there are none.
pub fn scheduled_hours(conn: &Connection, lesson_id: &str) -> TimetableResult<i64> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(lesson_end - lesson_start + 1), 0)
         FROM lesson_blocks
         WHERE lesson_id = ?",
        [lesson_id],
        |r| r.get(0),
    )?;
    Ok(total)
}

/// Recomputes and stores the counter. Callers are responsible for having
/// checked visibility of the lesson; block mutations call this on their
/// open transaction.
pub(crate) fn store(conn: &Connection, lesson_id: &str) -> TimetableResult<HoursSnapshot> {
    let current_hours = scheduled_hours(conn, lesson_id)?;
    let changed = conn.execute(
        "UPDATE lessons SET current_hours = ? WHERE id = ?",
        params![current_hours, lesson_id],
    )?;
    if changed == 0 {
        return Err(TimetableError::not_found("Lesson"));
    }
    let amount_of_hours: i64 = conn.query_row(
        "SELECT amount_of_hours FROM lessons WHERE id = ?",
        [lesson_id],
        |r| r.get(0),
    )?;
    debug!(lesson_id, current_hours, amount_of_hours, "lesson hours recomputed");
    Ok(HoursSnapshot {
        lesson_id: lesson_id.to_string(),
        amount_of_hours,
        current_hours,
    })
}

/// Scoped recompute. Absent when the lesson is missing or hidden.
pub fn recompute(
    conn: &Connection,
    lesson_id: &str,
    scope: &AccessScope,
) -> TimetableResult<Option<HoursSnapshot>> {
    if lessons::find(conn, lesson_id, scope)?.is_none() {
        return Ok(None);
    }
    store(conn, lesson_id).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::lessons::{create, NewLesson};
    use crate::roster::fixtures::*;

    fn seed_lesson(conn: &Connection) -> String {
        let s = schedule(conn, &admin(), "Main", 45);
        create(
            conn,
            NewLesson {
                schedule_id: s.id,
                name: "Maths".into(),
                amount_of_hours: 10,
                group_id: None,
                subgroup_id: None,
            },
            &admin(),
        )
        .unwrap()
        .id
    }

    fn raw_block(conn: &Connection, lesson_id: &str, start: i64, end: i64) {
        conn.execute(
            "INSERT INTO lesson_blocks(id, cluster_id, lesson_id, lesson_date, lesson_start, lesson_end)
             VALUES(?, 'c', ?, '2025-09-01', ?, ?)",
            params![uuid::Uuid::new_v4().to_string(), lesson_id, start, end],
        )
        .unwrap();
    }

    #[test]
    fn empty_lesson_sums_to_zero() {
        let conn = open_in_memory();
        let lesson = seed_lesson(&conn);
        let snap = recompute(&conn, &lesson, &admin()).unwrap().expect("visible");
        assert_eq!(snap.current_hours, 0);
        assert_eq!(snap.amount_of_hours, 10);
    }

    #[test]
    fn recompute_overwrites_drifted_value_and_is_idempotent() {
        let conn = open_in_memory();
        let lesson = seed_lesson(&conn);
        raw_block(&conn, &lesson, 0, 1);
        raw_block(&conn, &lesson, 3, 3);
        conn.execute("UPDATE lessons SET current_hours = 99 WHERE id = ?", [&lesson])
            .unwrap();

        let first = recompute(&conn, &lesson, &admin()).unwrap().expect("visible");
        let second = recompute(&conn, &lesson, &admin()).unwrap().expect("visible");
        assert_eq!(first.current_hours, 3);
        assert_eq!(first, second);
    }

    #[test]
    fn hidden_lesson_is_not_recomputed() {
        let conn = open_in_memory();
        let lesson = seed_lesson(&conn);
        raw_block(&conn, &lesson, 0, 0);
        assert!(recompute(&conn, &lesson, &member("bob")).unwrap().is_none());
        let stored: i64 = conn
            .query_row("SELECT current_hours FROM lessons WHERE id = ?", [&lesson], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, 0);
    }
}
