mod test_support;

use serde_json::json;
use test_support::{admin, Sidecar};

#[test]
fn setup_defaults_roundtrip_and_validation() {
    let mut sc = Sidecar::with_workspace("timetable-setup");
    let a = admin();

    let initial = sc.ok(&a, "setup.get", json!({}));
    assert_eq!(
        initial["timetable"],
        json!({
            "defaultSchoolHourMinutes": 45,
            "maxRecurrenceWeeks": 60,
            "defaultPageSize": 50,
            "maxPageSize": 200
        })
    );

    sc.ok(
        &a,
        "setup.update",
        json!({ "section": "timetable", "patch": { "defaultSchoolHourMinutes": 50, "maxRecurrenceWeeks": 3 } }),
    );
    let updated = sc.ok(&a, "setup.get", json!({}));
    assert_eq!(updated["timetable"]["defaultSchoolHourMinutes"], 50);
    assert_eq!(updated["timetable"]["maxRecurrenceWeeks"], 3);

    for patch in [
        json!({ "maxRecurrenceWeeks": 0 }),
        json!({ "defaultPageSize": 300, "maxPageSize": 250 }),
        json!({ "unknownField": 1 }),
        json!({ "defaultSchoolHourMinutes": "45" }),
    ] {
        let e = sc.fail(&a, "setup.update", json!({ "section": "timetable", "patch": patch }));
        assert_eq!(e["code"], "bad_params");
    }
    let e = sc.fail(&a, "setup.update", json!({ "section": "planner", "patch": {} }));
    assert_eq!(e["code"], "bad_params");
}

#[test]
fn setup_values_drive_schedule_defaults_and_recurrence_limit() {
    let mut sc = Sidecar::with_workspace("timetable-setup-applied");
    let a = admin();
    sc.ok(
        &a,
        "setup.update",
        json!({ "section": "timetable", "patch": { "defaultSchoolHourMinutes": 50, "maxRecurrenceWeeks": 3 } }),
    );

    let created = sc.ok(
        &a,
        "schedules.create",
        json!({ "name": "Defaults", "schoolYearStart": "2025-09-01", "schoolYearEnd": "2026-06-30" }),
    );
    assert_eq!(created["settings"]["schoolHourMinutes"], 50);
    let s = created["schedule"]["id"].as_str().expect("id").to_string();
    let p = sc.ok(&a, "periods.create", json!({ "scheduleId": s, "start": "08:00" }));
    assert_eq!(p["finish"], "08:50");

    let l = sc.lesson(&a, &s, "Maths", 10);
    let e = sc.fail(
        &a,
        "blocks.create",
        json!({ "lessonId": l, "fromDate": "2025-09-01", "toDate": "2025-09-22", "lessonStart": 0, "lessonEnd": 0 }),
    );
    assert_eq!(e["details"]["errors"][0]["code"], "out_of_range");
    sc.ok(
        &a,
        "blocks.create",
        json!({ "lessonId": l, "fromDate": "2025-09-01", "toDate": "2025-09-15", "lessonStart": 0, "lessonEnd": 0 }),
    );
}

#[test]
fn schedule_settings_partial_update() {
    let mut sc = Sidecar::with_workspace("timetable-settings");
    let a = admin();
    let s = sc.schedule(&a, "S", 45);

    let updated = sc.ok(
        &a,
        "settings.update",
        json!({ "scheduleId": s, "patch": { "schoolHourMinutes": 60 } }),
    );
    assert_eq!(updated["schoolHourMinutes"], 60);
    assert_eq!(updated["schoolYearStart"], "2025-09-01");

    let e = sc.fail(
        &a,
        "settings.update",
        json!({ "scheduleId": s, "patch": { "schoolYearEnd": "2025-08-01", "schoolHourMinutes": 0 } }),
    );
    assert_eq!(e["details"]["errors"].as_array().expect("errors").len(), 2);

    let got = sc.ok(&a, "settings.get", json!({ "scheduleId": s }));
    assert_eq!(got["schoolHourMinutes"], 60);
    assert_eq!(got["schoolYearEnd"], "2026-06-30");
}
