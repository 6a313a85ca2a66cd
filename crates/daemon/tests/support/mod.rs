#![forbid(unsafe_code)]
#![allow(dead_code)]

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub(crate) struct Server {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    storage_dir: PathBuf,
    next_id: i64,
}

impl Server {
    pub(crate) fn start(test_name: &str) -> Self {
        let storage_dir = temp_dir(test_name);
        let mut child = Command::new(env!("CARGO_BIN_EXE_regressd"))
            .arg("--storage-dir")
            .arg(&storage_dir)
            .arg("--no-task-manager")
            .env("REGRESS_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn regressd");

        let stdin = child.stdin.take().expect("stdin");
        let stdout = BufReader::new(child.stdout.take().expect("stdout"));
        Self {
            child,
            stdin,
            stdout,
            storage_dir,
            next_id: 0,
        }
    }

    pub(crate) fn send_line(&mut self, line: &str) {
        writeln!(self.stdin, "{line}").expect("write request");
        self.stdin.flush().expect("flush request");
    }

    pub(crate) fn send(&mut self, req: Value) {
        self.send_line(&req.to_string());
    }

    pub(crate) fn recv(&mut self) -> Value {
        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read response");
        assert!(!line.trim().is_empty(), "empty response line");
        serde_json::from_str(&line).expect("parse response json")
    }

    pub(crate) fn request(&mut self, req: Value) -> Value {
        self.send(req);
        self.recv()
    }

    /// Run `op` and return the full response envelope.
    pub(crate) fn call(&mut self, op: &str, args: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id;
        let resp = self.request(json!({ "id": id, "op": op, "args": args }));
        assert_eq!(resp["id"], id, "response id mismatch for {op}");
        resp
    }

    /// Run `op` and return its result, failing the test on an error envelope.
    pub(crate) fn ok(&mut self, op: &str, args: Value) -> Value {
        let resp = self.call(op, args);
        assert_eq!(resp["success"], true, "{op} failed: {resp}");
        resp["result"].clone()
    }

    /// Run `op` and return its error code.
    pub(crate) fn err_code(&mut self, op: &str, args: Value) -> String {
        let resp = self.call(op, args);
        assert_eq!(resp["success"], false, "{op} unexpectedly succeeded: {resp}");
        resp["error"]["code"]
            .as_str()
            .expect("error.code")
            .to_string()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.storage_dir);
    }
}

pub(crate) fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("rg_daemon_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}
