//! Thin create/list support for the rows the scheduling core reads:
//! schedules (with their settings), teachers, classrooms, groups, subgroups.

use crate::error::{TimetableError, TimetableResult, Violations, INVALID_DATE_RANGE, OUT_OF_RANGE, REQUIRED};
use crate::scope::{text, AccessScope, Predicate};
use crate::settings::{self, ScheduleSettings};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

const NAME_MAX_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub name: String,
    pub school_hour_minutes: i64,
    pub school_year_start: NaiveDate,
    pub school_year_end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RosterKind {
    Teacher,
    Classroom,
    Group,
}

impl RosterKind {
    fn table(self) -> &'static str {
        match self {
            RosterKind::Teacher => "teachers",
            RosterKind::Classroom => "classrooms",
            RosterKind::Group => "student_groups",
        }
    }

    pub fn entity(self) -> &'static str {
        match self {
            RosterKind::Teacher => "Teacher",
            RosterKind::Classroom => "Classroom",
            RosterKind::Group => "Group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedResource {
    pub id: String,
    pub parent_id: String,
    pub name: String,
}

pub(crate) fn check_name(name: &str, violations: &mut Violations) {
    if name.trim().is_empty() {
        violations.push("name", REQUIRED, "name must not be empty");
    } else if name.trim().len() > NAME_MAX_LEN {
        violations.push("name", OUT_OF_RANGE, format!("name length must be <= {NAME_MAX_LEN}"));
    }
}

pub fn find_schedule(
    conn: &Connection,
    schedule_id: &str,
    scope: &AccessScope,
) -> TimetableResult<Option<Schedule>> {
    let pred = Predicate::new()
        .and("s.id = ?", [text(schedule_id)])
        .scoped(scope, "s");
    let sql = format!("SELECT s.id, s.owner_id, s.name FROM schedules s {}", pred.where_clause());
    let row = conn
        .query_row(&sql, params_from_iter(pred.params()), |r| {
            Ok(Schedule {
                id: r.get(0)?,
                owner_id: r.get(1)?,
                name: r.get(2)?,
            })
        })
        .optional()?;
    Ok(row)
}

pub fn list_schedules(conn: &Connection, scope: &AccessScope) -> TimetableResult<Vec<Schedule>> {
    let pred = Predicate::new().scoped(scope, "s");
    let sql = format!(
        "SELECT s.id, s.owner_id, s.name FROM schedules s {} ORDER BY s.name, s.id",
        pred.where_clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(pred.params()), |r| {
            Ok(Schedule {
                id: r.get(0)?,
                owner_id: r.get(1)?,
                name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Creates a schedule owned by the caller together with its settings row.
pub fn create_schedule(
    conn: &Connection,
    input: NewSchedule,
    scope: &AccessScope,
) -> TimetableResult<(Schedule, ScheduleSettings)> {
    let mut violations = Violations::new();
    check_name(&input.name, &mut violations);
    settings::check_school_hour(input.school_hour_minutes, &mut violations);
    if input.school_year_start > input.school_year_end {
        violations.push(
            "schoolYearEnd",
            INVALID_DATE_RANGE,
            "schoolYearStart must not be after schoolYearEnd",
        );
    }
    violations.into_result()?;

    let name = input.name.trim().to_string();
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM schedules WHERE owner_id = ? AND name = ?",
            params![scope.user_id(), name],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(TimetableError::NameTaken {
            entity: "Schedule",
            name,
        });
    }

    let schedule = Schedule {
        id: Uuid::new_v4().to_string(),
        owner_id: scope.user_id().to_string(),
        name,
    };
    let settings = ScheduleSettings {
        id: Uuid::new_v4().to_string(),
        schedule_id: schedule.id.clone(),
        school_hour_minutes: input.school_hour_minutes,
        school_year_start: input.school_year_start,
        school_year_end: input.school_year_end,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO schedules(id, owner_id, name) VALUES(?, ?, ?)",
        params![schedule.id, schedule.owner_id, schedule.name],
    )?;
    tx.execute(
        "INSERT INTO schedule_settings(id, schedule_id, school_hour_minutes, school_year_start, school_year_end)
         VALUES(?, ?, ?, ?, ?)",
        params![
            settings.id,
            settings.schedule_id,
            settings.school_hour_minutes,
            settings.school_year_start,
            settings.school_year_end
        ],
    )?;
    tx.commit()?;

    info!(schedule_id = %schedule.id, owner = %schedule.owner_id, "schedule created");
    Ok((schedule, settings))
}

pub fn create_named(
    conn: &Connection,
    kind: RosterKind,
    schedule_id: &str,
    name: &str,
    scope: &AccessScope,
) -> TimetableResult<NamedResource> {
    let mut violations = Violations::new();
    check_name(name, &mut violations);
    violations.into_result()?;

    let schedule = find_schedule(conn, schedule_id, scope)?
        .ok_or_else(|| TimetableError::not_found("Schedule"))?;
    let name = name.trim().to_string();

    let taken: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE schedule_id = ? AND name = ?", kind.table()),
            params![schedule.id, name],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(TimetableError::NameTaken {
            entity: kind.entity(),
            name,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        &format!("INSERT INTO {}(id, schedule_id, name) VALUES(?, ?, ?)", kind.table()),
        params![id, schedule.id, name],
    )?;
    info!(entity = kind.entity(), id = %id, schedule_id = %schedule.id, "resource created");
    Ok(NamedResource {
        id,
        parent_id: schedule.id,
        name,
    })
}

pub fn create_subgroup(
    conn: &Connection,
    group_id: &str,
    name: &str,
    scope: &AccessScope,
) -> TimetableResult<NamedResource> {
    let mut violations = Violations::new();
    check_name(name, &mut violations);
    violations.into_result()?;

    let pred = Predicate::new()
        .and("g.id = ?", [text(group_id)])
        .scoped(scope, "s");
    let sql = format!(
        "SELECT g.id FROM student_groups g JOIN schedules s ON s.id = g.schedule_id {}",
        pred.where_clause()
    );
    let group: Option<String> = conn
        .query_row(&sql, params_from_iter(pred.params()), |r| r.get(0))
        .optional()?;
    let group = group.ok_or_else(|| TimetableError::not_found("Group"))?;
    let name = name.trim().to_string();

    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subgroups WHERE group_id = ? AND name = ?",
            params![group, name],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(TimetableError::NameTaken {
            entity: "Subgroup",
            name,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subgroups(id, group_id, name) VALUES(?, ?, ?)",
        params![id, group, name],
    )?;
    info!(id = %id, group_id = %group, "subgroup created");
    Ok(NamedResource {
        id,
        parent_id: group,
        name,
    })
}

/// Existence check used before a block references a teacher or classroom.
pub fn exists_in_schedule(
    conn: &Connection,
    kind: RosterKind,
    id: &str,
    schedule_id: &str,
) -> TimetableResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ? AND schedule_id = ?", kind.table()),
            params![id, schedule_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn schedules_are_scoped_to_owner() {
        let conn = open_in_memory();
        let alice = member("alice");
        let bob = member("bob");
        let s = schedule(&conn, &alice, "Autumn", 45);

        assert!(find_schedule(&conn, &s.id, &alice).unwrap().is_some());
        assert!(find_schedule(&conn, &s.id, &bob).unwrap().is_none());
        assert!(find_schedule(&conn, &s.id, &admin()).unwrap().is_some());
        assert_eq!(list_schedules(&conn, &bob).unwrap().len(), 0);
        assert_eq!(list_schedules(&conn, &admin()).unwrap().len(), 1);
    }

    #[test]
    fn schedule_names_unique_per_owner() {
        let conn = open_in_memory();
        schedule(&conn, &member("alice"), "Main", 45);
        schedule(&conn, &member("bob"), "Main", 45);
        let again = create_schedule(
            &conn,
            NewSchedule {
                name: " Main ".into(),
                school_hour_minutes: 45,
                school_year_start: date("2025-09-01"),
                school_year_end: date("2026-06-30"),
            },
            &member("alice"),
        );
        assert!(matches!(again, Err(TimetableError::NameTaken { entity: "Schedule", .. })));
    }

    #[test]
    fn schedule_validation_collects_all_problems() {
        let conn = open_in_memory();
        let res = create_schedule(
            &conn,
            NewSchedule {
                name: "".into(),
                school_hour_minutes: 0,
                school_year_start: date("2026-09-01"),
                school_year_end: date("2026-06-30"),
            },
            &admin(),
        );
        match res {
            Err(TimetableError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn schedule_school_hour_longer_than_a_day_is_rejected() {
        let conn = open_in_memory();
        let res = create_schedule(
            &conn,
            NewSchedule {
                name: "Main".into(),
                school_hour_minutes: 1441,
                school_year_start: date("2025-09-01"),
                school_year_end: date("2026-06-30"),
            },
            &admin(),
        );
        match res {
            Err(TimetableError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "schoolHourMinutes");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(list_schedules(&conn, &admin()).unwrap().is_empty());
    }

    #[test]
    fn named_resources_require_visible_schedule() {
        let conn = open_in_memory();
        let s = schedule(&conn, &member("alice"), "Main", 45);
        let denied = create_named(&conn, RosterKind::Teacher, &s.id, "Ms Smith", &member("bob"));
        assert!(matches!(denied, Err(TimetableError::NotFound(_))));

        let t = create_named(&conn, RosterKind::Teacher, &s.id, "Ms Smith", &member("alice")).unwrap();
        assert!(exists_in_schedule(&conn, RosterKind::Teacher, &t.id, &s.id).unwrap());
        assert!(!exists_in_schedule(&conn, RosterKind::Classroom, &t.id, &s.id).unwrap());

        let dup = create_named(&conn, RosterKind::Teacher, &s.id, "Ms Smith", &admin());
        assert!(matches!(dup, Err(TimetableError::NameTaken { .. })));
    }

    #[test]
    fn subgroups_hang_off_groups() {
        let conn = open_in_memory();
        let owner = member("alice");
        let s = schedule(&conn, &owner, "Main", 45);
        let g = create_named(&conn, RosterKind::Group, &s.id, "7A", &owner).unwrap();
        let sg = create_subgroup(&conn, &g.id, "7A-1", &owner).unwrap();
        assert_eq!(sg.parent_id, g.id);
        assert!(matches!(
            create_subgroup(&conn, &g.id, "7A-2", &member("mallory")),
            Err(TimetableError::NotFound(_))
        ));
    }
}
