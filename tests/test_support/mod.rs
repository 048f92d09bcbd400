#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn admin() -> Value {
    json!({ "userId": "admin-1", "role": "admin" })
}

pub fn user(id: &str) -> Value {
    json!({ "userId": id, "role": "user" })
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_timetabled");
        let mut child = Command::new(exe)
            .env_remove("TIMETABLED_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn timetabled");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns and selects a fresh workspace.
    pub fn with_workspace(prefix: &str) -> Self {
        let mut sc = Self::spawn();
        let workspace = temp_dir(prefix);
        let resp = sc.raw(json!({
            "id": "ws",
            "method": "workspace.select",
            "params": { "path": workspace.to_string_lossy() }
        }));
        assert_eq!(resp["ok"], json!(true), "workspace.select failed: {}", resp);
        sc
    }

    pub fn raw(&mut self, payload: Value) -> Value {
        self.raw_line(&payload.to_string())
    }

    pub fn raw_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, caller: Option<&Value>, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(c) = caller {
            payload["caller"] = c.clone();
        }
        let value = self.raw(payload);
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, caller: &Value, method: &str, params: Value) -> Value {
        let value = self.request(Some(caller), method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Asserts failure and returns the `error` object.
    pub fn fail(&mut self, caller: &Value, method: &str, params: Value) -> Value {
        let value = self.request(Some(caller), method, params);
        assert_eq!(value.get("ok"), Some(&json!(false)), "{} unexpectedly ok: {}", method, value);
        value.get("error").cloned().expect("error object")
    }

    pub fn schedule(&mut self, caller: &Value, name: &str, minutes: i64) -> String {
        let res = self.ok(
            caller,
            "schedules.create",
            json!({
                "name": name,
                "schoolHourMinutes": minutes,
                "schoolYearStart": "2025-09-01",
                "schoolYearEnd": "2026-06-30"
            }),
        );
        res["schedule"]["id"].as_str().expect("schedule id").to_string()
    }

    pub fn period(&mut self, caller: &Value, schedule_id: &str, start: &str) -> String {
        let res = self.ok(caller, "periods.create", json!({ "scheduleId": schedule_id, "start": start }));
        res["id"].as_str().expect("period id").to_string()
    }

    pub fn lesson(&mut self, caller: &Value, schedule_id: &str, name: &str, hours: i64) -> String {
        let res = self.ok(
            caller,
            "lessons.create",
            json!({ "scheduleId": schedule_id, "name": name, "amountOfHours": hours }),
        );
        res["id"].as_str().expect("lesson id").to_string()
    }

    pub fn current_hours(&mut self, caller: &Value, lesson_id: &str) -> i64 {
        let res = self.ok(caller, "lessons.get", json!({ "lessonId": lesson_id }));
        res["currentHours"].as_i64().expect("currentHours")
    }

    /// Sum of spans over every block of the lesson, read back through the listing.
    pub fn listed_span_total(&mut self, caller: &Value, lesson_id: &str) -> i64 {
        let res = self.ok(
            caller,
            "blocks.list",
            json!({ "filter": { "kind": "lesson", "id": lesson_id }, "paging": { "pageSize": 200 } }),
        );
        res["items"]
            .as_array()
            .expect("items")
            .iter()
            .map(|b| b["lessonEnd"].as_i64().expect("end") - b["lessonStart"].as_i64().expect("start") + 1)
            .sum()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
