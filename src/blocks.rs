//! Dated lesson blocks and the clusters they are created in.
//!
//! One create call emits a block per occurrence date, all sharing a cluster
//! id. Updates and deletes address either one block or a whole cluster. Every
//! mutation is written together with the recomputed hours of each lesson it
//! touched, in one transaction.

use crate::error::{
    TimetableError, TimetableResult, Violations, INVALID_DATE_RANGE, INVALID_PERIOD_SPAN, INVALID_VALUE,
    OUT_OF_RANGE, REQUIRED,
};
use crate::hours::{self, HoursSnapshot};
use crate::lessons;
use crate::paging::{Page, PageLimits, PageParams, PageRequest, SortField, SortSpec};
use crate::periods;
use crate::roster::{self, RosterKind};
use crate::scope::{text, AccessScope, Predicate};
use chrono::{Duration, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

pub const BLOCK_SORT: SortSpec = SortSpec {
    fields: &[
        SortField { name: "Id", column: "b.id" },
        SortField { name: "LessonDate", column: "b.lesson_date" },
        SortField { name: "LessonStart", column: "b.lesson_start" },
        SortField { name: "LessonEnd", column: "b.lesson_end" },
        SortField { name: "ClusterId", column: "b.cluster_id" },
    ],
    default_field: "LessonDate",
    tiebreak: "b.lesson_start, b.id",
};

pub const DEFAULT_MAX_OCCURRENCES: usize = 60;

const BLOCK_COLUMNS: &str = "b.id, b.cluster_id, b.lesson_id, b.lesson_date, b.lesson_start, b.lesson_end, b.classroom_id, b.teacher_id";
const BLOCK_JOINS: &str = "FROM lesson_blocks b
         JOIN lessons l ON l.id = b.lesson_id
         JOIN schedules s ON s.id = l.schedule_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonBlock {
    pub id: String,
    pub cluster_id: String,
    pub lesson_id: String,
    pub lesson_date: NaiveDate,
    pub lesson_start: i64,
    pub lesson_end: i64,
    pub classroom_id: Option<String>,
    pub teacher_id: Option<String>,
}

impl LessonBlock {
    /// Number of periods the block occupies.
    pub fn span(&self) -> i64 {
        self.lesson_end - self.lesson_start + 1
    }

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(LessonBlock {
            id: r.get(0)?,
            cluster_id: r.get(1)?,
            lesson_id: r.get(2)?,
            lesson_date: r.get(3)?,
            lesson_start: r.get(4)?,
            lesson_end: r.get(5)?,
            classroom_id: r.get(6)?,
            teacher_id: r.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDates {
    Single(NaiveDate),
    Weekly { from: NaiveDate, to: NaiveDate },
}

impl BlockDates {
    /// Expands into occurrence dates. Weekly ranges walk from `from` in 7-day
    /// steps while the date is `<= to`.
    pub fn occurrences(&self, max_occurrences: usize, violations: &mut Violations) -> Vec<NaiveDate> {
        let (from, to) = match *self {
            BlockDates::Single(d) => return vec![d],
            BlockDates::Weekly { from, to } => (from, to),
        };
        if from > to {
            violations.push("toDate", INVALID_DATE_RANGE, "fromDate must not be after toDate");
            return Vec::new();
        }
        let count = (to - from).num_days() / 7 + 1;
        if count > max_occurrences as i64 {
            violations.push(
                "toDate",
                OUT_OF_RANGE,
                format!("recurrence yields {count} occurrences, limit is {max_occurrences}"),
            );
            return Vec::new();
        }
        let mut out = Vec::with_capacity(count as usize);
        let mut current = from;
        while current <= to {
            out.push(current);
            match current.checked_add_signed(Duration::weeks(1)) {
                Some(next) => current = next,
                None => break,
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct NewBlocks {
    pub lesson_id: String,
    pub dates: BlockDates,
    pub lesson_start: i64,
    pub lesson_end: i64,
    pub classroom_id: Option<String>,
    pub teacher_id: Option<String>,
    /// Generated when absent.
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBlocks {
    pub cluster_id: String,
    pub blocks: Vec<LessonBlock>,
    pub hours: HoursSnapshot,
}

/// Blocks touched by an update or delete and the hours of every lesson that
/// gained or lost periods.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMutation {
    pub blocks: Vec<LessonBlock>,
    pub hours: Vec<HoursSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockTarget {
    Block(String),
    Cluster(String),
}

impl BlockTarget {
    pub fn from_flag(id: impl Into<String>, whole_cluster: bool) -> Self {
        if whole_cluster {
            BlockTarget::Cluster(id.into())
        } else {
            BlockTarget::Block(id.into())
        }
    }

    fn predicate(&self) -> Predicate {
        match self {
            BlockTarget::Block(id) => Predicate::new().and("b.id = ?", [text(id)]),
            BlockTarget::Cluster(id) => Predicate::new().and("b.cluster_id = ?", [text(id)]),
        }
    }
}

/// `None` leaves a field untouched; for the optional assignments,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct BlockPatch {
    /// For a cluster this is the new date of its earliest block; the others
    /// move by the same number of days.
    pub lesson_date: Option<NaiveDate>,
    pub day_shift: Option<i64>,
    pub lesson_start: Option<i64>,
    pub lesson_end: Option<i64>,
    pub lesson_id: Option<String>,
    pub classroom_id: Option<Option<String>>,
    pub teacher_id: Option<Option<String>>,
}

impl BlockPatch {
    fn is_empty(&self) -> bool {
        self.lesson_date.is_none()
            && self.day_shift.is_none()
            && self.lesson_start.is_none()
            && self.lesson_end.is_none()
            && self.lesson_id.is_none()
            && self.classroom_id.is_none()
            && self.teacher_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterBy {
    Schedule(String),
    Group(String),
    Subgroup(String),
    Cluster(String),
    Teacher(String),
    Classroom(String),
    Lesson(String),
}

impl FilterBy {
    pub fn parse(kind: &str, id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        match kind.to_ascii_lowercase().as_str() {
            "schedule" => Some(FilterBy::Schedule(id)),
            "group" => Some(FilterBy::Group(id)),
            "subgroup" => Some(FilterBy::Subgroup(id)),
            "cluster" => Some(FilterBy::Cluster(id)),
            "teacher" => Some(FilterBy::Teacher(id)),
            "classroom" => Some(FilterBy::Classroom(id)),
            "lesson" => Some(FilterBy::Lesson(id)),
            _ => None,
        }
    }

    fn apply(&self, pred: Predicate) -> Predicate {
        match self {
            FilterBy::Schedule(id) => pred.and("l.schedule_id = ?", [text(id)]),
            // A group also owns the lessons of its subgroups.
            FilterBy::Group(id) => pred.and(
                "(l.group_id = ? OR l.subgroup_id IN (SELECT sg.id FROM subgroups sg WHERE sg.group_id = ?))",
                [text(id), text(id)],
            ),
            FilterBy::Subgroup(id) => pred.and("l.subgroup_id = ?", [text(id)]),
            FilterBy::Cluster(id) => pred.and("b.cluster_id = ?", [text(id)]),
            FilterBy::Teacher(id) => pred.and("b.teacher_id = ?", [text(id)]),
            FilterBy::Classroom(id) => pred.and("b.classroom_id = ?", [text(id)]),
            FilterBy::Lesson(id) => pred.and("b.lesson_id = ?", [text(id)]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockQuery {
    pub filter: FilterBy,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub paging: PageParams,
}

fn check_span(start: i64, end: i64, violations: &mut Violations) {
    if start < 0 {
        violations.push("lessonStart", INVALID_PERIOD_SPAN, "lessonStart must be >= 0");
    }
    if end < start {
        violations.push("lessonEnd", INVALID_PERIOD_SPAN, "lessonEnd must be >= lessonStart");
    }
}

fn span_overflow(period_count: i64, violations: &mut Violations) {
    violations.push(
        "lessonEnd",
        INVALID_PERIOD_SPAN,
        format!("lessonEnd must be below the {period_count} periods defined for the schedule"),
    );
}

fn ensure_assignment(
    conn: &Connection,
    kind: RosterKind,
    id: Option<&str>,
    schedule_id: &str,
) -> TimetableResult<()> {
    if let Some(id) = id {
        if !roster::exists_in_schedule(conn, kind, id, schedule_id)? {
            return Err(TimetableError::not_found(kind.entity()));
        }
    }
    Ok(())
}

fn date_param(d: NaiveDate) -> Value {
    Value::Text(d.format("%Y-%m-%d").to_string())
}

pub fn create(
    conn: &Connection,
    input: NewBlocks,
    max_occurrences: usize,
    scope: &AccessScope,
) -> TimetableResult<CreatedBlocks> {
    let mut violations = Violations::new();
    check_span(input.lesson_start, input.lesson_end, &mut violations);
    let dates = input.dates.occurrences(max_occurrences, &mut violations);
    if matches!(&input.cluster_id, Some(c) if c.trim().is_empty()) {
        violations.push("clusterId", REQUIRED, "clusterId must not be blank");
    }
    violations.into_result()?;

    let lesson = lessons::find(conn, &input.lesson_id, scope)?
        .ok_or_else(|| TimetableError::not_found("Lesson"))?;
    let period_count = periods::period_count(conn, &lesson.schedule_id)?;
    if input.lesson_end >= period_count {
        let mut violations = Violations::new();
        span_overflow(period_count, &mut violations);
        violations.into_result()?;
    }
    ensure_assignment(conn, RosterKind::Classroom, input.classroom_id.as_deref(), &lesson.schedule_id)?;
    ensure_assignment(conn, RosterKind::Teacher, input.teacher_id.as_deref(), &lesson.schedule_id)?;

    let cluster_id = match input.cluster_id {
        Some(c) => c.trim().to_string(),
        None => Uuid::new_v4().to_string(),
    };
    let blocks: Vec<LessonBlock> = dates
        .into_iter()
        .map(|lesson_date| LessonBlock {
            id: Uuid::new_v4().to_string(),
            cluster_id: cluster_id.clone(),
            lesson_id: lesson.id.clone(),
            lesson_date,
            lesson_start: input.lesson_start,
            lesson_end: input.lesson_end,
            classroom_id: input.classroom_id.clone(),
            teacher_id: input.teacher_id.clone(),
        })
        .collect();

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO lesson_blocks(id, cluster_id, lesson_id, lesson_date, lesson_start, lesson_end, classroom_id, teacher_id)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for b in &blocks {
            stmt.execute(params![
                b.id,
                b.cluster_id,
                b.lesson_id,
                b.lesson_date,
                b.lesson_start,
                b.lesson_end,
                b.classroom_id,
                b.teacher_id
            ])?;
        }
    }
    // Once per call, after the whole batch is in place.
    let hours = hours::store(&tx, &lesson.id)?;
    tx.commit()?;

    info!(
        cluster_id = %cluster_id,
        lesson_id = %lesson.id,
        blocks = blocks.len(),
        periods = blocks.iter().map(LessonBlock::span).sum::<i64>(),
        current_hours = hours.current_hours,
        "lesson blocks created"
    );
    Ok(CreatedBlocks {
        cluster_id,
        blocks,
        hours,
    })
}

struct TargetRow {
    block: LessonBlock,
    schedule_id: String,
}

fn load_targets(conn: &Connection, target: &BlockTarget, scope: &AccessScope) -> TimetableResult<Vec<TargetRow>> {
    let pred = target.predicate().scoped(scope, "s");
    let sql = format!(
        "SELECT {BLOCK_COLUMNS}, l.schedule_id
         {BLOCK_JOINS}
         {}
         ORDER BY b.lesson_date, b.lesson_start, b.id",
        pred.where_clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(pred.params()), |r| {
            Ok(TargetRow {
                block: LessonBlock::from_row(r)?,
                schedule_id: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn recompute_all(conn: &Connection, lesson_ids: &BTreeSet<String>) -> TimetableResult<Vec<HoursSnapshot>> {
    lesson_ids.iter().map(|id| hours::store(conn, id)).collect()
}

/// Returns `None` when the target resolves to no block visible to `scope`.
pub fn update(
    conn: &Connection,
    target: &BlockTarget,
    patch: BlockPatch,
    scope: &AccessScope,
) -> TimetableResult<Option<BlockMutation>> {
    let mut violations = Violations::new();
    if patch.is_empty() {
        violations.push("patch", REQUIRED, "patch must change at least one field");
    }
    if patch.lesson_date.is_some() && patch.day_shift.is_some() {
        violations.push("dayShift", INVALID_VALUE, "use either lessonDate or dayShift");
    }
    if matches!(patch.lesson_start, Some(s) if s < 0) {
        violations.push("lessonStart", INVALID_PERIOD_SPAN, "lessonStart must be >= 0");
    }
    if matches!(&patch.lesson_id, Some(l) if l.trim().is_empty()) {
        violations.push("lessonId", REQUIRED, "lessonId must not be blank");
    }
    violations.into_result()?;

    let targets = load_targets(conn, target, scope)?;
    let Some(reference) = targets.first() else {
        return Ok(None);
    };
    let shift = match (patch.lesson_date, patch.day_shift) {
        (Some(d), _) => (d - reference.block.lesson_date).num_days(),
        (None, Some(days)) => days,
        (None, None) => 0,
    };

    let moved_to = match &patch.lesson_id {
        Some(id) => Some(lessons::find(conn, id.trim(), scope)?.ok_or_else(|| TimetableError::not_found("Lesson"))?),
        None => None,
    };

    let mut affected = BTreeSet::new();
    let mut period_counts: HashMap<String, i64> = HashMap::new();
    let mut reversed = false;
    let mut overflow: Option<i64> = None;
    let mut date_overflow = false;
    let mut updated = Vec::with_capacity(targets.len());

    for row in &targets {
        let mut b = row.block.clone();
        affected.insert(b.lesson_id.clone());
        let schedule_id = match &moved_to {
            Some(lesson) => {
                b.lesson_id = lesson.id.clone();
                affected.insert(lesson.id.clone());
                lesson.schedule_id.clone()
            }
            None => row.schedule_id.clone(),
        };
        if shift != 0 {
            match Duration::try_days(shift).and_then(|d| b.lesson_date.checked_add_signed(d)) {
                Some(d) => b.lesson_date = d,
                None => date_overflow = true,
            }
        }
        if let Some(s) = patch.lesson_start {
            b.lesson_start = s;
        }
        if let Some(e) = patch.lesson_end {
            b.lesson_end = e;
        }
        if let Some(c) = &patch.classroom_id {
            b.classroom_id = c.clone();
        }
        if let Some(t) = &patch.teacher_id {
            b.teacher_id = t.clone();
        }

        if b.lesson_end < b.lesson_start {
            reversed = true;
        }
        let count = match period_counts.get(&schedule_id) {
            Some(n) => *n,
            None => {
                let n = periods::period_count(conn, &schedule_id)?;
                period_counts.insert(schedule_id.clone(), n);
                n
            }
        };
        if b.lesson_end >= count {
            overflow = Some(count);
        }
        updated.push((b, schedule_id));
    }

    let mut violations = Violations::new();
    if date_overflow {
        violations.push("lessonDate", OUT_OF_RANGE, "shifted date is out of range");
    }
    if reversed {
        violations.push("lessonEnd", INVALID_PERIOD_SPAN, "lessonEnd must be >= lessonStart");
    }
    if let Some(count) = overflow {
        span_overflow(count, &mut violations);
    }
    violations.into_result()?;

    let mut checked: HashSet<(RosterKind, String, String)> = HashSet::new();
    for (b, schedule_id) in &updated {
        for (kind, id) in [
            (RosterKind::Classroom, b.classroom_id.as_deref()),
            (RosterKind::Teacher, b.teacher_id.as_deref()),
        ] {
            let Some(id) = id else { continue };
            if checked.insert((kind, id.to_string(), schedule_id.clone())) {
                ensure_assignment(conn, kind, Some(id), schedule_id)?;
            }
        }
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "UPDATE lesson_blocks
             SET lesson_id = ?, lesson_date = ?, lesson_start = ?, lesson_end = ?, classroom_id = ?, teacher_id = ?
             WHERE id = ?",
        )?;
        for (b, _) in &updated {
            stmt.execute(params![
                b.lesson_id,
                b.lesson_date,
                b.lesson_start,
                b.lesson_end,
                b.classroom_id,
                b.teacher_id,
                b.id
            ])?;
        }
    }
    let hours = recompute_all(&tx, &affected)?;
    tx.commit()?;

    info!(block_target = ?target, blocks = updated.len(), lessons = hours.len(), "lesson blocks updated");
    Ok(Some(BlockMutation {
        blocks: updated.into_iter().map(|(b, _)| b).collect(),
        hours,
    }))
}

/// Returns `None` when the target resolves to no block visible to `scope`.
pub fn delete(conn: &Connection, target: &BlockTarget, scope: &AccessScope) -> TimetableResult<Option<BlockMutation>> {
    let targets = load_targets(conn, target, scope)?;
    if targets.is_empty() {
        return Ok(None);
    }
    let affected: BTreeSet<String> = targets.iter().map(|t| t.block.lesson_id.clone()).collect();

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare("DELETE FROM lesson_blocks WHERE id = ?")?;
        for t in &targets {
            stmt.execute([&t.block.id])?;
        }
    }
    let hours = recompute_all(&tx, &affected)?;
    tx.commit()?;

    info!(block_target = ?target, blocks = targets.len(), lessons = hours.len(), "lesson blocks deleted");
    Ok(Some(BlockMutation {
        blocks: targets.into_iter().map(|t| t.block).collect(),
        hours,
    }))
}

/// Deletes by an identifier of unknown kind: tried as a block id first, then
/// as a cluster id.
pub fn delete_by_id(conn: &Connection, id: &str, scope: &AccessScope) -> TimetableResult<Option<BlockMutation>> {
    if let Some(done) = delete(conn, &BlockTarget::Block(id.to_string()), scope)? {
        return Ok(Some(done));
    }
    delete(conn, &BlockTarget::Cluster(id.to_string()), scope)
}

pub fn list(
    conn: &Connection,
    query: &BlockQuery,
    limits: PageLimits,
    scope: &AccessScope,
) -> TimetableResult<Page<LessonBlock>> {
    let mut violations = Violations::new();
    if let (Some(from), Some(to)) = (query.from_date, query.to_date) {
        if from > to {
            violations.push("toDate", INVALID_DATE_RANGE, "fromDate must not be after toDate");
        }
    }
    let page = PageRequest::resolve(&query.paging, &BLOCK_SORT, limits, &mut violations);
    violations.into_result()?;

    let mut pred = query.filter.apply(Predicate::new());
    if let Some(from) = query.from_date {
        pred = pred.and("b.lesson_date >= ?", [date_param(from)]);
    }
    if let Some(to) = query.to_date {
        pred = pred.and("b.lesson_date <= ?", [date_param(to)]);
    }
    let pred = pred.scoped(scope, "s");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {BLOCK_JOINS} {}", pred.where_clause()),
        params_from_iter(pred.params()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT {BLOCK_COLUMNS} {BLOCK_JOINS} {} {} LIMIT ? OFFSET ?",
        pred.where_clause(),
        page.order_by()
    );
    let mut args = pred.into_params();
    args.push(Value::Integer(page.page_size));
    args.push(Value::Integer(page.offset()));
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params_from_iter(args.iter()), LessonBlock::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    debug!(filter = ?query.filter, total, returned = items.len(), "lesson blocks listed");

    Ok(Page {
        items,
        page: page.page,
        page_size: page.page_size,
        total,
    })
}
