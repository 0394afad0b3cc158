//! The Dockerfile and .dockerignore at the repository root are generated
//! from `ImageDescriptor::default()` and must stay in sync with it.

use image_builder::{
    render_dockerfile, render_dockerignore, BuildContext, ImageDescriptor, SECRET_KEY_ENV,
};
use std::fs;
use tempfile::TempDir;

const COMMITTED_DOCKERFILE: &str = include_str!("../../Dockerfile");
const COMMITTED_DOCKERIGNORE: &str = include_str!("../../.dockerignore");

#[test]
fn test_committed_dockerfile_matches_default_descriptor() {
    let rendered = render_dockerfile(&ImageDescriptor::default()).unwrap();
    assert_eq!(
        rendered, COMMITTED_DOCKERFILE,
        "regenerate with `college-api dockerfile --out .`"
    );
}

#[test]
fn test_committed_dockerignore_matches_default_descriptor() {
    assert_eq!(
        render_dockerignore(&ImageDescriptor::default()),
        COMMITTED_DOCKERIGNORE
    );
}

#[test]
fn test_committed_dockerfile_has_no_baked_secret() {
    assert!(!COMMITTED_DOCKERFILE.contains(&format!("ENV {}", SECRET_KEY_ENV)));
    assert!(!COMMITTED_DOCKERFILE.contains("ARG "));
}

#[test]
fn test_committed_dockerfile_listens_on_exposed_port_only() {
    let exposed: Vec<&str> = COMMITTED_DOCKERFILE
        .lines()
        .filter_map(|l| l.strip_prefix("EXPOSE "))
        .collect();
    assert_eq!(exposed, vec!["8000"]);

    let cmd = COMMITTED_DOCKERFILE
        .lines()
        .rev()
        .find(|l| l.starts_with("CMD "))
        .unwrap();
    assert!(cmd.contains("\"--port\", \"8000\""));
    assert!(cmd.contains("\"--host\", \"0.0.0.0\""));
}

fn write_context(dir: &TempDir, dependencies: &str) {
    fs::write(
        dir.path().join("Cargo.toml"),
        format!(
            "[package]\nname = \"college-api\"\nversion = \"0.1.0\"\n\n[dependencies]\n{}",
            dependencies
        ),
    )
    .unwrap();
    fs::write(dir.path().join("Cargo.lock"), "version = 3\n").unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
}

#[test]
fn test_manifest_edit_changes_only_dependency_set() {
    let descriptor = ImageDescriptor::default().with_include(vec!["src".to_string()]);
    let dir = TempDir::new().unwrap();
    let context = BuildContext::new(dir.path());

    write_context(&dir, "serde = \"1\"\n");
    let before = context.inspect(&descriptor).unwrap();
    let dockerfile_before = render_dockerfile(&descriptor).unwrap();

    write_context(&dir, "serde = \"1\"\nchrono = \"0.4\"\n");
    let after = context.inspect(&descriptor).unwrap();
    let dockerfile_after = render_dockerfile(&descriptor).unwrap();

    assert!(!before.dependencies.contains("chrono"));
    assert!(after.dependencies.contains("chrono"));
    assert_eq!(dockerfile_before, dockerfile_after);
}

#[test]
fn test_build_requires_valid_manifest() {
    let descriptor = ImageDescriptor::default().with_include(vec!["src".to_string()]);
    let dir = TempDir::new().unwrap();
    let context = BuildContext::new(dir.path());

    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("Cargo.lock"), "version = 3\n").unwrap();
    assert!(context.inspect(&descriptor).is_err(), "manifest missing");

    fs::write(dir.path().join("Cargo.toml"), "[package\n").unwrap();
    assert!(context.inspect(&descriptor).is_err(), "manifest invalid");

    write_context(&dir, "");
    assert!(context.inspect(&descriptor).is_ok());
}
