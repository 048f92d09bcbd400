mod test_support;

use serde_json::json;
use test_support::{admin, temp_dir, Sidecar};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut sc = Sidecar::spawn();
    let a = admin();

    let health = sc.ok(&a, "health", json!({}));
    assert!(health["workspacePath"].is_null());
    let e = sc.fail(&a, "schedules.list", json!({}));
    assert_eq!(e["code"], "no_workspace");

    let workspace = temp_dir("timetable-router-smoke");
    sc.ok(&a, "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    assert!(workspace.join("timetable.sqlite3").exists());

    let s = sc.schedule(&a, "Smoke", 45);
    let e = sc.fail(
        &a,
        "schedules.create",
        json!({ "name": "Smoke", "schoolYearStart": "2025-09-01", "schoolYearEnd": "2026-06-30" }),
    );
    assert_eq!(e["code"], "name_taken");

    let group = sc.ok(&a, "groups.create", json!({ "scheduleId": s, "name": "7A" }));
    let group_id = group["id"].as_str().expect("group").to_string();
    let sub = sc.ok(&a, "subgroups.create", json!({ "groupId": group_id, "name": "7A-1" }));
    let teacher = sc.ok(&a, "teachers.create", json!({ "scheduleId": s, "name": "Ms T" }));
    sc.ok(&a, "classrooms.create", json!({ "scheduleId": s, "name": "R1" }));
    sc.period(&a, &s, "08:00");
    let lesson = sc.ok(
        &a,
        "lessons.create",
        json!({ "scheduleId": s, "name": "Maths", "amountOfHours": 3, "subgroupId": sub["id"] }),
    );
    assert_eq!(lesson["currentHours"], 0);
    sc.ok(
        &a,
        "blocks.create",
        json!({ "lessonId": lesson["id"], "date": "2025-09-01", "lessonStart": 0, "lessonEnd": 0, "teacherId": teacher["id"] }),
    );

    for (kind, id) in [
        ("group", group_id.clone()),
        ("subgroup", sub["id"].as_str().expect("sub").to_string()),
        ("teacher", teacher["id"].as_str().expect("teacher").to_string()),
    ] {
        let listed = sc.ok(&a, "blocks.list", json!({ "filter": { "kind": kind, "id": id } }));
        assert_eq!(listed["total"], 1, "filter {}", kind);
    }

    sc.ok(&a, "setup.get", json!({}));
    sc.ok(&a, "settings.get", json!({ "scheduleId": s }));
    sc.ok(&a, "periods.list", json!({ "scheduleId": s }));
    sc.ok(&a, "lessons.recomputeHours", json!({ "lessonId": lesson["id"] }));

    let e = sc.fail(&a, "marksets.list", json!({}));
    assert_eq!(e["code"], "not_implemented");

    let bad = sc.raw_line("{not json");
    assert_eq!(bad["error"]["code"], "bad_json");
    // The loop keeps serving after a malformed line.
    sc.ok(&a, "health", json!({}));
}
