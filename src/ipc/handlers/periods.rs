use crate::ipc::error::err;
use crate::ipc::handlers::setup::load_timetable_setup;
use crate::ipc::helpers::{
    absent, caller_scope, core_err, db_conn, parse_params, parse_time, required_str, respond, to_value, Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::paging::PageParams;
use crate::periods::{self, PeriodPatch};
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::json;

fn time_param(req: &Request, params: &serde_json::Value, key: &str) -> Result<Option<NaiveTime>, serde_json::Value> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) => parse_time(req, key, s).map(Some),
            None => Err(err(&req.id, "bad_params", format!("{key} must be a string"), None)),
        },
    }
}

fn handle_periods_create(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let schedule_id = required_str(req, "scheduleId")?;
    let Some(start) = time_param(req, &req.params, "start")? else {
        return Err(err(&req.id, "bad_params", "missing start", None));
    };
    let finish = time_param(req, &req.params, "finish")?;
    let period = periods::create(conn, &schedule_id, start, finish, &scope).map_err(|e| core_err(req, e))?;
    to_value(req, &period)
}

fn handle_periods_update(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let period_id = required_str(req, "periodId")?;
    let Some(patch) = req.params.get("patch").filter(|v| v.is_object()) else {
        return Err(err(&req.id, "bad_params", "patch must be an object", None));
    };
    let patch = PeriodPatch {
        start: time_param(req, patch, "start")?,
        finish: time_param(req, patch, "finish")?,
    };
    match periods::update(conn, &period_id, patch, &scope).map_err(|e| core_err(req, e))? {
        Some(p) => to_value(req, &p),
        None => Err(absent(req, "LessonPeriod")),
    }
}

fn handle_periods_delete(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let period_id = required_str(req, "periodId")?;
    if !periods::delete(conn, &period_id, &scope).map_err(|e| core_err(req, e))? {
        return Err(absent(req, "LessonPeriod"));
    }
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    schedule_id: String,
    #[serde(default)]
    paging: PageParams,
}

fn handle_periods_list(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let p: ListParams = parse_params(req)?;
    let limits = load_timetable_setup(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
        .page_limits();
    match periods::list(conn, &p.schedule_id, &p.paging, limits, &scope).map_err(|e| core_err(req, e))? {
        Some(page) => to_value(req, &page),
        None => Err(absent(req, "ScheduleSettings")),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let reply = match req.method.as_str() {
        "periods.create" => handle_periods_create(state, req),
        "periods.update" => handle_periods_update(state, req),
        "periods.delete" => handle_periods_delete(state, req),
        "periods.list" => handle_periods_list(state, req),
        _ => return None,
    };
    Some(respond(req, reply))
}
