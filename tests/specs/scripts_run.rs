use crate::prelude::*;
use std::time::Duration;

#[test]
fn mcp_tools_list_includes_scripts_and_logs_tools() {
    let project = Project::empty();
    project.file("package.json", r#"{"scripts": {"dev": "echo hi"}}"#);
    project.foreman().passes();

    wait_for(SPEC_WAIT_MAX_MS, || {
        std::fs::read_dir(project.instances_path()).map(|mut d| d.next().is_some()).unwrap_or(false)
    });

    let announced = std::fs::read_dir(project.instances_path())
        .expect("instances dir should exist")
        .next()
        .expect("an instance should have announced itself")
        .expect("dir entry should be readable");
    let raw = std::fs::read_to_string(announced.path()).expect("announcement file should be readable");
    let instance: serde_json::Value = serde_json::from_str(&raw).expect("announcement should be JSON");
    let port = instance["port"].as_u64().expect("announcement should carry a port");

    let client = reqwest::blocking::Client::builder().timeout(Duration::from_secs(5)).build().unwrap();
    let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}});
    let resp: serde_json::Value =
        client.post(format!("http://127.0.0.1:{port}/mcp")).json(&body).send().unwrap().json().unwrap();

    let names: Vec<&str> = resp["result"]["tools"]
        .as_array()
        .expect("tools/list should return an array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"scripts_run"));
    assert!(names.contains(&"logs_search"));
}
