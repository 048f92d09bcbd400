use crate::hours;
use crate::ipc::helpers::{absent, caller_scope, core_err, db_conn, parse_params, required_str, respond, to_value, Reply};
use crate::ipc::types::{AppState, Request};
use crate::lessons::{self, NewLesson};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    schedule_id: String,
    name: String,
    amount_of_hours: i64,
    group_id: Option<String>,
    subgroup_id: Option<String>,
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let p: CreateParams = parse_params(req)?;
    let input = NewLesson {
        schedule_id: p.schedule_id,
        name: p.name,
        amount_of_hours: p.amount_of_hours,
        group_id: p.group_id,
        subgroup_id: p.subgroup_id,
    };
    let lesson = lessons::create(conn, input, &scope).map_err(|e| core_err(req, e))?;
    to_value(req, &lesson)
}

fn handle_lessons_get(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let lesson_id = required_str(req, "lessonId")?;
    match lessons::find(conn, &lesson_id, &scope).map_err(|e| core_err(req, e))? {
        Some(lesson) => to_value(req, &lesson),
        None => Err(absent(req, "Lesson")),
    }
}

fn handle_lessons_recompute(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let lesson_id = required_str(req, "lessonId")?;
    match hours::recompute(conn, &lesson_id, &scope).map_err(|e| core_err(req, e))? {
        Some(snapshot) => to_value(req, &snapshot),
        None => Err(absent(req, "Lesson")),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let reply = match req.method.as_str() {
        "lessons.create" => handle_lessons_create(state, req),
        "lessons.get" => handle_lessons_get(state, req),
        "lessons.recomputeHours" => handle_lessons_recompute(state, req),
        _ => return None,
    };
    Some(respond(req, reply))
}
