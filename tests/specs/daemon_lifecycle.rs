use crate::prelude::*;

#[test]
fn starting_with_no_scripts_reports_the_mcp_endpoint() {
    let project = Project::empty();
    project.file("package.json", r#"{"scripts": {"dev": "echo hi"}}"#);

    let out = project.foreman().passes();
    out.stdout_has("/mcp");

    // Give the spawned foremand a moment to announce, then ask foreman to
    // run in this same directory again: it should reuse the port rather
    // than failing to bind a second instance.
    wait_for(SPEC_WAIT_MAX_MS, || {
        std::fs::read_dir(project.instances_path()).map(|mut d| d.next().is_some()).unwrap_or(false)
    });

    let second = project.foreman().passes();
    assert_eq!(out.stdout(), second.stdout(), "both invocations should resolve to the same running instance");
}

#[test]
fn unknown_script_name_fails_with_a_clear_error() {
    let project = Project::empty();
    project.file("package.json", r#"{"scripts": {"dev": "echo hi"}}"#);

    project.foreman().args(&["does-not-exist"]).fails().stderr_has("does-not-exist");
}
