use crate::ipc::error::err;
use crate::ipc::handlers::setup::load_timetable_setup;
use crate::ipc::helpers::{
    absent, caller_scope, core_err, db_conn, parse_date, parse_opt_date, parse_params, required_str, respond,
    to_value, Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, NewSchedule, RosterKind};
use crate::settings::{self, SettingsPatch};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateScheduleParams {
    name: String,
    school_hour_minutes: Option<i64>,
    school_year_start: String,
    school_year_end: String,
}

fn handle_schedules_create(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let p: CreateScheduleParams = parse_params(req)?;
    let school_hour_minutes = match p.school_hour_minutes {
        Some(m) => m,
        None => {
            load_timetable_setup(conn)
                .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
                .default_school_hour_minutes
        }
    };
    let input = NewSchedule {
        name: p.name,
        school_hour_minutes,
        school_year_start: parse_date(req, "schoolYearStart", &p.school_year_start)?,
        school_year_end: parse_date(req, "schoolYearEnd", &p.school_year_end)?,
    };
    let (schedule, settings) = roster::create_schedule(conn, input, &scope).map_err(|e| core_err(req, e))?;
    Ok(json!({ "schedule": schedule, "settings": settings }))
}

fn handle_schedules_list(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let schedules = roster::list_schedules(conn, &scope).map_err(|e| core_err(req, e))?;
    Ok(json!({ "schedules": schedules }))
}

fn handle_named_create(state: &mut AppState, req: &Request, kind: RosterKind) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let schedule_id = required_str(req, "scheduleId")?;
    let name = req.params.get("name").and_then(|v| v.as_str()).unwrap_or_default();
    let created = roster::create_named(conn, kind, &schedule_id, name, &scope).map_err(|e| core_err(req, e))?;
    to_value(req, &created)
}

fn handle_subgroups_create(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let group_id = required_str(req, "groupId")?;
    let name = req.params.get("name").and_then(|v| v.as_str()).unwrap_or_default();
    let created = roster::create_subgroup(conn, &group_id, name, &scope).map_err(|e| core_err(req, e))?;
    to_value(req, &created)
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let schedule_id = required_str(req, "scheduleId")?;
    match settings::resolve(conn, &schedule_id, &scope).map_err(|e| core_err(req, e))? {
        Some(s) => to_value(req, &s),
        None => Err(absent(req, "ScheduleSettings")),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SettingsPatchParams {
    school_hour_minutes: Option<i64>,
    school_year_start: Option<String>,
    school_year_end: Option<String>,
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let schedule_id = required_str(req, "scheduleId")?;
    let raw: SettingsPatchParams = match req.params.get("patch") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| err(&req.id, "bad_params", e.to_string(), None))?,
        None => return Err(err(&req.id, "bad_params", "patch must be an object", None)),
    };
    let patch = SettingsPatch {
        school_hour_minutes: raw.school_hour_minutes,
        school_year_start: parse_opt_date(req, "schoolYearStart", raw.school_year_start.as_deref())?,
        school_year_end: parse_opt_date(req, "schoolYearEnd", raw.school_year_end.as_deref())?,
    };
    match settings::update(conn, &schedule_id, patch, &scope).map_err(|e| core_err(req, e))? {
        Some(s) => to_value(req, &s),
        None => Err(absent(req, "ScheduleSettings")),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let reply = match req.method.as_str() {
        "schedules.create" => handle_schedules_create(state, req),
        "schedules.list" => handle_schedules_list(state, req),
        "teachers.create" => handle_named_create(state, req, RosterKind::Teacher),
        "classrooms.create" => handle_named_create(state, req, RosterKind::Classroom),
        "groups.create" => handle_named_create(state, req, RosterKind::Group),
        "subgroups.create" => handle_subgroups_create(state, req),
        "settings.get" => handle_settings_get(state, req),
        "settings.update" => handle_settings_update(state, req),
        _ => return None,
    };
    Some(respond(req, reply))
}
