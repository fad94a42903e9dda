use crate::prelude::*;

#[test]
fn help_lists_mcp_and_dir_flags() {
    cli().args(&["--help"]).passes().stdout_has("--dir").stdout_has("--mcp").stdout_has("--port");
}

#[test]
fn version_prints_something() {
    let out = cli().args(&["--version"]).passes();
    assert!(!out.stdout().trim().is_empty());
}

#[test]
fn no_mcp_without_a_running_instance_fails_fast() {
    let project = Project::empty();
    project
        .foreman()
        .args(&["--no-mcp", "dev"])
        .fails()
        .stderr_has("--no-mcp");
}
