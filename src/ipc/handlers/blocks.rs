use crate::blocks::{self, BlockDates, BlockPatch, BlockQuery, BlockTarget, FilterBy, NewBlocks};
use crate::ipc::error::err;
use crate::ipc::handlers::setup::load_timetable_setup;
use crate::ipc::helpers::{
    absent, caller_scope, core_err, db_conn, nullable, parse_date, parse_opt_date, parse_params, respond, to_value,
    Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::paging::PageParams;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    lesson_id: String,
    lesson_start: i64,
    lesson_end: i64,
    cluster_id: Option<String>,
    classroom_id: Option<String>,
    teacher_id: Option<String>,
    date: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
}

fn block_dates(req: &Request, p: &CreateParams) -> Result<BlockDates, Value> {
    match (&p.date, &p.from_date, &p.to_date) {
        (Some(d), None, None) => Ok(BlockDates::Single(parse_date(req, "date", d)?)),
        (None, Some(from), Some(to)) => Ok(BlockDates::Weekly {
            from: parse_date(req, "fromDate", from)?,
            to: parse_date(req, "toDate", to)?,
        }),
        _ => Err(err(
            &req.id,
            "bad_params",
            "provide either date or both fromDate and toDate",
            None,
        )),
    }
}

fn handle_blocks_create(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let p: CreateParams = parse_params(req)?;
    let dates = block_dates(req, &p)?;
    let setup = load_timetable_setup(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let input = NewBlocks {
        lesson_id: p.lesson_id,
        dates,
        lesson_start: p.lesson_start,
        lesson_end: p.lesson_end,
        classroom_id: p.classroom_id,
        teacher_id: p.teacher_id,
        cluster_id: p.cluster_id,
    };
    let created = blocks::create(conn, input, setup.max_occurrences(), &scope).map_err(|e| core_err(req, e))?;
    to_value(req, &created)
}

/// `{blockId}`, `{clusterId}`, or `{id, updateWholeCluster}`.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TargetParams {
    block_id: Option<String>,
    cluster_id: Option<String>,
    id: Option<String>,
    #[serde(default)]
    update_whole_cluster: bool,
}

fn resolve_target(req: &Request, t: TargetParams) -> Result<BlockTarget, Value> {
    match (t.block_id, t.cluster_id, t.id) {
        (Some(b), None, None) => Ok(BlockTarget::Block(b)),
        (None, Some(c), None) => Ok(BlockTarget::Cluster(c)),
        (None, None, Some(id)) => Ok(BlockTarget::from_flag(id, t.update_whole_cluster)),
        _ => Err(err(
            &req.id,
            "bad_params",
            "target must name exactly one of blockId, clusterId, id",
            None,
        )),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PatchParams {
    lesson_date: Option<String>,
    day_shift: Option<i64>,
    lesson_start: Option<i64>,
    lesson_end: Option<i64>,
    lesson_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    classroom_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    teacher_id: Option<Option<String>>,
}

#[derive(Deserialize)]
struct UpdateParams {
    target: TargetParams,
    patch: PatchParams,
}

fn handle_blocks_update(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let p: UpdateParams = parse_params(req)?;
    let target = resolve_target(req, p.target)?;
    let patch = BlockPatch {
        lesson_date: parse_opt_date(req, "lessonDate", p.patch.lesson_date.as_deref())?,
        day_shift: p.patch.day_shift,
        lesson_start: p.patch.lesson_start,
        lesson_end: p.patch.lesson_end,
        lesson_id: p.patch.lesson_id,
        classroom_id: p.patch.classroom_id,
        teacher_id: p.patch.teacher_id,
    };
    match blocks::update(conn, &target, patch, &scope).map_err(|e| core_err(req, e))? {
        Some(done) => to_value(req, &done),
        None => Err(absent(req, "LessonBlock")),
    }
}

fn handle_blocks_delete(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let t: TargetParams = parse_params(req)?;
    let deleted = match (t.block_id, t.cluster_id, t.id) {
        (Some(b), None, None) => blocks::delete(conn, &BlockTarget::Block(b), &scope),
        (None, Some(c), None) => blocks::delete(conn, &BlockTarget::Cluster(c), &scope),
        (None, None, Some(id)) => blocks::delete_by_id(conn, &id, &scope),
        _ => {
            return Err(err(
                &req.id,
                "bad_params",
                "provide exactly one of blockId, clusterId, id",
                None,
            ))
        }
    };
    match deleted.map_err(|e| core_err(req, e))? {
        Some(done) => to_value(req, &done),
        None => Err(absent(req, "LessonBlock")),
    }
}

#[derive(Deserialize)]
struct FilterParams {
    kind: String,
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    filter: FilterParams,
    from_date: Option<String>,
    to_date: Option<String>,
    #[serde(default)]
    paging: PageParams,
}

fn handle_blocks_list(state: &mut AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let scope = caller_scope(req)?;
    let p: ListParams = parse_params(req)?;
    let Some(filter) = FilterBy::parse(&p.filter.kind, p.filter.id) else {
        return Err(err(
            &req.id,
            "bad_params",
            "filter.kind must be one of: schedule, group, subgroup, cluster, teacher, classroom, lesson",
            None,
        ));
    };
    let query = BlockQuery {
        filter,
        from_date: parse_opt_date(req, "fromDate", p.from_date.as_deref())?,
        to_date: parse_opt_date(req, "toDate", p.to_date.as_deref())?,
        paging: p.paging,
    };
    let limits = load_timetable_setup(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
        .page_limits();
    let page = blocks::list(conn, &query, limits, &scope).map_err(|e| core_err(req, e))?;
    to_value(req, &page)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let reply = match req.method.as_str() {
        "blocks.create" => handle_blocks_create(state, req),
        "blocks.update" => handle_blocks_update(state, req),
        "blocks.delete" => handle_blocks_delete(state, req),
        "blocks.list" => handle_blocks_list(state, req),
        _ => return None,
    };
    Some(respond(req, reply))
}
