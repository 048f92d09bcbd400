use crate::error::{TimetableError, TimetableResult, Violations, OUT_OF_RANGE};
use crate::roster::{self, check_name};
use crate::scope::{text, AccessScope, Predicate};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub schedule_id: String,
    pub name: String,
    pub group_id: Option<String>,
    pub subgroup_id: Option<String>,
    pub amount_of_hours: i64,
    /// Derived from the lesson's blocks; only the hours aggregator writes it.
    pub current_hours: i64,
}

#[derive(Debug, Clone)]
pub struct NewLesson {
    pub schedule_id: String,
    pub name: String,
    pub amount_of_hours: i64,
    pub group_id: Option<String>,
    pub subgroup_id: Option<String>,
}

pub fn find(conn: &Connection, lesson_id: &str, scope: &AccessScope) -> TimetableResult<Option<Lesson>> {
    let pred = Predicate::new()
        .and("l.id = ?", [text(lesson_id)])
        .scoped(scope, "s");
    let sql = format!(
        "SELECT l.id, l.schedule_id, l.name, l.group_id, l.subgroup_id, l.amount_of_hours, l.current_hours
         FROM lessons l
         JOIN schedules s ON s.id = l.schedule_id
         {}",
        pred.where_clause()
    );
    let row = conn
        .query_row(&sql, params_from_iter(pred.params()), |r| {
            Ok(Lesson {
                id: r.get(0)?,
                schedule_id: r.get(1)?,
                name: r.get(2)?,
                group_id: r.get(3)?,
                subgroup_id: r.get(4)?,
                amount_of_hours: r.get(5)?,
                current_hours: r.get(6)?,
            })
        })
        .optional()?;
    Ok(row)
}

pub fn create(conn: &Connection, input: NewLesson, scope: &AccessScope) -> TimetableResult<Lesson> {
    let mut violations = Violations::new();
    check_name(&input.name, &mut violations);
    if input.amount_of_hours < 1 {
        violations.push("amountOfHours", OUT_OF_RANGE, "amountOfHours must be >= 1");
    }
    violations.into_result()?;

    let schedule = roster::find_schedule(conn, &input.schedule_id, scope)?
        .ok_or_else(|| TimetableError::not_found("Schedule"))?;

    if let Some(group_id) = &input.group_id {
        if !roster::exists_in_schedule(conn, roster::RosterKind::Group, group_id, &schedule.id)? {
            return Err(TimetableError::not_found("Group"));
        }
    }
    if let Some(subgroup_id) = &input.subgroup_id {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM subgroups sg JOIN student_groups g ON g.id = sg.group_id
                 WHERE sg.id = ? AND g.schedule_id = ?",
                params![subgroup_id, schedule.id],
                |r| r.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(TimetableError::not_found("Subgroup"));
        }
    }

    let name = input.name.trim().to_string();
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM lessons WHERE schedule_id = ? AND name = ?",
            params![schedule.id, name],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(TimetableError::NameTaken {
            entity: "Lesson",
            name,
        });
    }

    let lesson = Lesson {
        id: Uuid::new_v4().to_string(),
        schedule_id: schedule.id,
        name,
        group_id: input.group_id,
        subgroup_id: input.subgroup_id,
        amount_of_hours: input.amount_of_hours,
        current_hours: 0,
    };
    conn.execute(
        "INSERT INTO lessons(id, schedule_id, name, group_id, subgroup_id, amount_of_hours, current_hours)
         VALUES(?, ?, ?, ?, ?, ?, 0)",
        params![
            lesson.id,
            lesson.schedule_id,
            lesson.name,
            lesson.group_id,
            lesson.subgroup_id,
            lesson.amount_of_hours
        ],
    )?;
    info!(lesson_id = %lesson.id, schedule_id = %lesson.schedule_id, "lesson created");
    Ok(lesson)
}
