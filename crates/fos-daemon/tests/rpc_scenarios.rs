//! End-to-end protocol scenarios through the dispatcher.
//!
//! These exercise the full stack below HTTP: envelope parsing, method
//! routing, parameter binding, the operations themselves, and error
//! translation, against a real temporary directory and an in-process
//! lock backend.

use std::sync::Arc;
use std::time::Duration;

use fos_core::lock::{LockClient, MemoryLockBackend};
use fos_core::ops::{FileOps, MAX_READ};
use fos_core::path::RootDir;
use fos_daemon::rpc::Dispatcher;
use serde_json::{Value, json};
use tempfile::TempDir;

struct Service {
    _dir: TempDir,
    dispatcher: Dispatcher,
}

fn service() -> Service {
    let dir = tempfile::tempdir().unwrap();
    let root = RootDir::new(dir.path().canonicalize().unwrap()).unwrap();
    let locks =
        LockClient::new(Arc::new(MemoryLockBackend::new())).with_retry(3, Duration::from_millis(2));
    Service {
        dispatcher: Dispatcher::new(Arc::new(FileOps::new(root, locks))),
        _dir: dir,
    }
}

fn request(method: &str, params: Value, id: i64) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id})
}

async fn call(service: &Service, body: &Value) -> Value {
    let raw = service
        .dispatcher
        .handle(body.to_string().as_bytes())
        .await
        .expect("expected a response body");
    serde_json::from_str(&raw).unwrap()
}

async fn call_ok(service: &Service, method: &str, params: Value) -> Value {
    let response = call(service, &request(method, params, 1)).await;
    assert!(
        response.get("error").is_none(),
        "unexpected error: {response}"
    );
    response["result"].clone()
}

#[tokio::test]
async fn create_file_append_read_round_trip() {
    let s = service();
    let payload = "r".repeat(8192);

    assert_eq!(call_ok(&s, "create", json!(["r.txt", "FILE"])).await, json!(true));
    assert_eq!(
        call_ok(&s, "append", json!(["r.txt", payload])).await,
        json!(true)
    );
    assert_eq!(
        call_ok(&s, "read", json!(["r.txt", 0, MAX_READ])).await,
        json!(payload)
    );
}

#[tokio::test]
async fn list_returns_exactly_the_created_entries() {
    let s = service();
    call_ok(&s, "create", json!(["p", "DIRECTORY"])).await;
    call_ok(&s, "create", json!(["p/a", "FILE"])).await;
    call_ok(&s, "create", json!(["p/b", "FILE"])).await;
    call_ok(&s, "create", json!(["p/c", "DIRECTORY"])).await;

    let listing = call_ok(&s, "listDirectory", json!(["p"])).await;
    let mut names: Vec<String> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["a", "b", "c"]);

    for entry in listing.as_array().unwrap() {
        let path = entry["path"].as_str().unwrap();
        assert!(path.starts_with("p/"), "descriptor path leaked: {path}");
    }
}

#[tokio::test]
async fn escape_attempt_is_rejected_without_side_effects() {
    let s = service();
    let response = call(&s, &request("getFileInfo", json!(["../../etc/passwd"]), 4)).await;
    assert_eq!(response["error"]["code"], json!(-32602));
    assert_eq!(response["error"]["data"]["kind"], json!("PathEscape"));

    let response = call(
        &s,
        &request("append", json!(["../outside.txt", "escaped"]), 5),
    )
    .await;
    assert_eq!(response["error"]["data"]["kind"], json!("PathEscape"));
}

#[tokio::test]
async fn directory_delete_scenario() {
    let s = service();
    call_ok(&s, "create", json!(["t", "DIRECTORY"])).await;
    call_ok(&s, "create", json!(["t/a.txt", "FILE"])).await;
    call_ok(&s, "create", json!(["t/sub", "DIRECTORY"])).await;
    call_ok(&s, "create", json!(["t/sub/b.txt", "FILE"])).await;

    let refused = call(&s, &request("delete", json!(["t", false]), 1)).await;
    assert_eq!(refused["error"]["data"]["kind"], json!("DirectoryNotEmpty"));

    assert_eq!(call_ok(&s, "delete", json!(["t", true])).await, json!(true));

    let gone = call(&s, &request("getFileInfo", json!(["t"]), 2)).await;
    assert_eq!(gone["error"]["data"]["kind"], json!("NotFound"));
}

#[tokio::test]
async fn delete_twice_returns_true_then_false() {
    let s = service();
    call_ok(&s, "create", json!(["once.txt", "FILE"])).await;
    assert_eq!(
        call_ok(&s, "delete", json!(["once.txt", false])).await,
        json!(true)
    );
    assert_eq!(
        call_ok(&s, "delete", json!(["once.txt", false])).await,
        json!(false)
    );
}

#[tokio::test]
async fn move_and_copy_between_directories() {
    let s = service();
    call_ok(&s, "create", json!(["src", "DIRECTORY"])).await;
    call_ok(&s, "create", json!(["dst", "DIRECTORY"])).await;
    call_ok(&s, "create", json!(["src/f.txt", "FILE"])).await;
    call_ok(&s, "append", json!(["src/f.txt", "contents"])).await;

    call_ok(&s, "copy", json!(["src/f.txt", "dst/copy.txt"])).await;
    call_ok(
        &s,
        "move",
        json!({"sourcePath": "src/f.txt", "targetPath": "dst/moved.txt"}),
    )
    .await;

    assert_eq!(
        call_ok(&s, "read", json!(["dst/copy.txt", 0, 1024])).await,
        json!("contents")
    );
    assert_eq!(
        call_ok(&s, "read", json!(["dst/moved.txt", 0, 1024])).await,
        json!("contents")
    );
    let gone = call(&s, &request("getFileInfo", json!(["src/f.txt"]), 9)).await;
    assert_eq!(gone["error"]["data"]["kind"], json!("NotFound"));
}

#[tokio::test]
async fn batch_of_notifications_produces_no_body() {
    let s = service();
    let body: Vec<Value> = (0..4)
        .map(|i| {
            json!({
                "jsonrpc": "2.0",
                "method": "create",
                "params": [format!("n{i}.txt"), "FILE"],
            })
        })
        .collect();
    assert!(
        s.dispatcher
            .handle(json!(body).to_string().as_bytes())
            .await
            .is_none()
    );

    // All four side effects happened.
    for i in 0..4 {
        call_ok(&s, "getFileInfo", json!([format!("n{i}.txt")])).await;
    }
}

#[tokio::test]
async fn batch_of_k_requests_produces_k_responses() {
    let s = service();
    let body: Vec<Value> = (0..5)
        .map(|i| request("create", json!([format!("b{i}.txt"), "FILE"]), i))
        .collect();
    let response = call(&s, &json!(body)).await;
    let array = response.as_array().unwrap();
    assert_eq!(array.len(), 5);
    for (i, element) in array.iter().enumerate() {
        assert_eq!(element["id"], json!(i));
        assert_eq!(element["result"], json!(true));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_through_the_dispatcher_do_not_interleave() {
    let s = service();
    call_ok(&s, "create", json!(["log.txt", "FILE"])).await;

    let dispatcher = Arc::new(s.dispatcher.clone());
    let word = "w".repeat(100);
    let workers = 4;
    let appends_per_worker = 8;

    let mut handles = Vec::new();
    for _ in 0..workers {
        let dispatcher = Arc::clone(&dispatcher);
        let word = word.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..appends_per_worker {
                loop {
                    let body = json!({
                        "jsonrpc": "2.0",
                        "method": "append",
                        "params": ["log.txt", word],
                        "id": 1,
                    });
                    let raw = dispatcher
                        .handle(body.to_string().as_bytes())
                        .await
                        .unwrap();
                    let response: Value = serde_json::from_str(&raw).unwrap();
                    if response.get("error").is_none() {
                        break;
                    }
                    assert_eq!(
                        response["error"]["data"]["kind"],
                        json!("LockUnavailable"),
                        "unexpected failure: {response}"
                    );
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let contents = call_ok(&s, "read", json!(["log.txt", 0, MAX_READ])).await;
    let contents = contents.as_str().unwrap();
    assert_eq!(contents.len(), 100 * workers * appends_per_worker);
    for chunk in contents.as_bytes().chunks(100) {
        assert_eq!(chunk, word.as_bytes(), "interleaved append detected");
    }
}

#[tokio::test]
async fn read_validation_errors_are_invalid_params() {
    let s = service();
    call_ok(&s, "create", json!(["v.txt", "FILE"])).await;

    for params in [
        json!(["v.txt", -1, 5]),
        json!(["v.txt", 0, -5]),
        json!(["v.txt", 0, MAX_READ + 1]),
        json!(["v.txt", 1, 1]),
    ] {
        let response = call(&s, &request("read", params.clone(), 3)).await;
        assert_eq!(
            response["error"]["code"],
            json!(-32602),
            "params {params} should be invalid"
        );
        assert_eq!(response["error"]["data"]["kind"], json!("InvalidArgument"));
    }
}
