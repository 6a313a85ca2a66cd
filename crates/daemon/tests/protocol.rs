#![forbid(unsafe_code)]

mod support;

use serde_json::json;
use std::process::{Command, Stdio};
use support::{Server, temp_dir};

#[test]
fn envelope_echoes_id_and_op() {
    let mut server = Server::start("envelope_echoes_id_and_op");
    let resp = server.request(json!({"id": "abc", "op": "project.list"}));
    assert_eq!(resp["id"], "abc");
    assert_eq!(resp["op"], "project.list");
    assert_eq!(resp["success"], true);
    assert_eq!(resp["result"]["projects"], json!([]));
}

#[test]
fn malformed_requests_fail_closed() {
    let mut server = Server::start("malformed_requests_fail_closed");

    server.send_line("{not json");
    let resp = server.recv();
    assert_eq!(resp["success"], false);
    assert_eq!(resp["id"], serde_json::Value::Null);
    assert_eq!(resp["error"]["code"], "INVALID_INPUT");

    let resp = server.request(json!({"id": 1, "args": {}}));
    assert_eq!(resp["error"]["code"], "INVALID_INPUT");

    let resp = server.request(json!({"id": 2, "op": "project.list", "args": [1]}));
    assert_eq!(resp["error"]["code"], "INVALID_INPUT");

    assert_eq!(server.err_code("trial.delete", json!({})), "UNKNOWN_OP");

    // The loop keeps serving after failures.
    server.ok("project.list", json!({}));
}

#[test]
fn specifiers_must_be_ids_or_names() {
    let mut server = Server::start("specifiers_must_be_ids_or_names");
    server.ok("project.create", json!({"name": "P1", "url": "git://p1"}));
    server.ok("version.create", json!({"project": "P1", "name": "v1"}));

    for bad in [json!([1]), json!({"id": 1}), json!(true), json!(0)] {
        let code = server.err_code(
            "trials.create_for_build",
            json!({"project": bad, "version": "v1", "BUILD_NUMBER": 1, "path": "/b/1"}),
        );
        assert_eq!(code, "INVALID_INPUT");
    }
    assert_eq!(
        server.err_code(
            "trials.create_for_build",
            json!({"project": "P9", "version": "v1", "BUILD_NUMBER": 1, "path": "/b/1"}),
        ),
        "NOT_FOUND"
    );
    assert_eq!(
        server.err_code(
            "trials.create_for_build",
            json!({"project": 1, "version": "v7", "BUILD_NUMBER": 1, "path": "/b/1"}),
        ),
        "NOT_FOUND"
    );
}

#[test]
fn build_workflow_end_to_end() {
    let mut server = Server::start("build_workflow_end_to_end");
    let project = server.ok("project.create", json!({"name": "P1", "url": "git://p1"}));
    let project_id = project["id"].as_i64().expect("project id");
    let version = server.ok("version.create", json!({"project": project_id, "name": "v1"}));
    let version_id = version["version"]["id"].as_i64().expect("version id");

    let a = server.ok(
        "testcase.create",
        json!({"project": "P1", "key": "a", "command": "stubA check a", "timeout": 60}),
    );
    let b = server.ok(
        "testcase.create",
        json!({"project": "P1", "key": "b", "command": "stubB check b"}),
    );

    let created = server.ok(
        "trials.create_for_build",
        json!({"project": "P1", "version": version_id, "BUILD_NUMBER": 42, "path": "/builds/42"}),
    );
    assert_eq!(created["trials"].as_array().map(Vec::len), Some(2));

    // Recent trials exist now, so a second call creates nothing.
    let again = server.ok(
        "trials.create_for_build",
        json!({"project": "P1", "version": "v1", "BUILD_NUMBER": 42, "path": "/builds/42"}),
    );
    assert_eq!(again["trials"], json!([]));

    let posted = server.ok(
        "workspace.post",
        json!({"path": "/ws/stubA", "stub": "stubA", "project": "P1", "BUILD_NUMBER": 42}),
    );
    let workspace_id = posted["workspace"]["id"].as_i64().expect("workspace id");
    assert_eq!(posted["trials"].as_array().map(Vec::len), Some(1));
    assert_eq!(posted["trials"][0]["testcase"], a["id"]);

    let finished = server.ok("stub.finish", json!({"stub": "stubA", "BUILD_NUMBER": 42}));
    assert_eq!(finished["trials"][0]["status"], "pending");
    assert_eq!(finished["notifications"][0]["action"], "add");
    let trial_a = finished["trials"][0]["id"].clone();

    let listed = server.ok(
        "trial.list",
        json!({"project": "P1", "BUILD_NUMBER": 42, "status": "compiling"}),
    );
    assert_eq!(listed["trials"][0]["testcase"], b["id"]);

    let deleted = server.ok("workspace.try_delete", json!({"workspace": workspace_id}));
    assert_eq!(deleted["deleted"], false);
    assert_eq!(deleted["stubs"], 1);

    let passed = server.ok("trial.set_status", json!({"id": trial_a, "status": "passed"}));
    assert_eq!(passed["testcase"]["status"], "passed");

    let live = server.ok("snapshot.live", json!({"version": version_id}));
    assert_eq!(live["passed"], json!([a["id"]]));
    assert_eq!(live["unverified"], json!([b["id"]]));
    assert_eq!(live["total"], 2);

    let view = server.ok("trial.get", json!({"id": trial_a}));
    assert_eq!(view["BUILD_NUMBER"], 42);
    assert_eq!(view["workspace"], workspace_id);
    assert_eq!(view["recent"], trial_a);

    let status = server.ok("channel.status", json!({}));
    assert_eq!(status["enabled"], false);
    assert_eq!(status["backlog"], 2);
}

#[test]
fn new_version_reclassifies_verdicts() {
    let mut server = Server::start("new_version_reclassifies_verdicts");
    server.ok("project.create", json!({"name": "P1", "url": "git://p1"}));
    let v1 = server.ok("version.create", json!({"project": "P1", "name": "v1"}));
    let t1 = server.ok("testcase.create", json!({"project": "P1", "key": "t1", "command": "run t1"}));
    server.ok("testcase.update", json!({"id": t1["id"], "status": "passed"}));

    let v2 = server.ok("version.create", json!({"project": "P1", "name": "v2"}));
    assert_eq!(
        v2["reclassified"],
        json!([{"testcase": t1["id"], "from": "passed", "to": "candidate2"}])
    );
    let t1 = server.ok("testcase.get", json!({"id": t1["id"]}));
    assert_eq!(t1["status"], "candidate2");

    let live = server.ok("snapshot.live", json!({"version": v2["version"]["id"]}));
    assert_eq!(live["unverified"], json!([t1["id"]]));
    let old = server.ok("snapshot.list", json!({"version": v1["version"]["id"]}));
    assert_eq!(old["snapshots"].as_array().map(Vec::len), Some(1));

    assert_eq!(
        server.err_code("version.create", json!({"project": "P1", "name": "v2"})),
        "CONFLICT"
    );
}

#[test]
fn invalid_configuration_exits_with_code_two() {
    let dir = temp_dir("invalid_configuration_exits_with_code_two");
    let status = Command::new(env!("CARGO_BIN_EXE_regressd"))
        .arg("--storage-dir")
        .arg(&dir)
        .arg("--task-manager-url")
        .arg("http://localhost:8023/backend1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("run regressd");
    assert_eq!(status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&dir);
}
