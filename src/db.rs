use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path, file_name: &str) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(file_name);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(owner_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_owner ON schedules(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_settings(
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL UNIQUE,
            school_hour_minutes INTEGER NOT NULL CHECK(school_hour_minutes > 0),
            school_year_start TEXT NOT NULL,
            school_year_end TEXT NOT NULL,
            FOREIGN KEY(schedule_id) REFERENCES schedules(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_periods(
            id TEXT PRIMARY KEY,
            settings_id TEXT NOT NULL,
            start TEXT NOT NULL,
            finish TEXT NOT NULL,
            FOREIGN KEY(settings_id) REFERENCES schedule_settings(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_periods_settings ON lesson_periods(settings_id, start)",
        [],
    )?;

    // Named per-schedule resources. `student_groups` avoids the GROUPS keyword.
    for table in ["teachers", "classrooms", "student_groups"] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table}(
                    id TEXT PRIMARY KEY,
                    schedule_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    UNIQUE(schedule_id, name),
                    FOREIGN KEY(schedule_id) REFERENCES schedules(id)
                )"
            ),
            [],
        )?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subgroups(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(group_id, name),
            FOREIGN KEY(group_id) REFERENCES student_groups(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            name TEXT NOT NULL,
            group_id TEXT,
            subgroup_id TEXT,
            amount_of_hours INTEGER NOT NULL CHECK(amount_of_hours >= 1),
            current_hours INTEGER NOT NULL DEFAULT 0,
            UNIQUE(schedule_id, name),
            FOREIGN KEY(schedule_id) REFERENCES schedules(id),
            FOREIGN KEY(group_id) REFERENCES student_groups(id),
            FOREIGN KEY(subgroup_id) REFERENCES subgroups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_schedule ON lessons(schedule_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_blocks(
            id TEXT PRIMARY KEY,
            cluster_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            lesson_date TEXT NOT NULL,
            lesson_start INTEGER NOT NULL,
            lesson_end INTEGER NOT NULL,
            classroom_id TEXT,
            teacher_id TEXT,
            CHECK(lesson_start >= 0 AND lesson_end >= lesson_start),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_blocks_cluster ON lesson_blocks(cluster_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_blocks_lesson ON lesson_blocks(lesson_id, lesson_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_blocks_teacher ON lesson_blocks(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_blocks_classroom ON lesson_blocks(classroom_id)",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory sqlite");
    init_schema(&conn).expect("schema");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_roundtrip_overwrites() {
        let conn = open_in_memory();
        assert!(settings_get_json(&conn, "setup.timetable").unwrap().is_none());
        settings_set_json(&conn, "setup.timetable", &json!({ "maxRecurrenceWeeks": 10 })).unwrap();
        settings_set_json(&conn, "setup.timetable", &json!({ "maxRecurrenceWeeks": 12 })).unwrap();
        assert_eq!(
            settings_get_json(&conn, "setup.timetable").unwrap(),
            Some(json!({ "maxRecurrenceWeeks": 12 }))
        );
    }

    #[test]
    fn schema_init_is_repeatable() {
        let conn = open_in_memory();
        init_schema(&conn).expect("second init");
    }
}
