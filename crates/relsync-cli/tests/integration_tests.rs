//! End-to-end tests that drive the `relsync` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Scratch layout: a build output directory, a local "remote" and a client directory.
struct TestContext {
    temp_dir: TempDir,
    build: PathBuf,
    remote: PathBuf,
    client: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let build = temp_dir.path().join("build");
        let remote = temp_dir.path().join("remote");
        let client = temp_dir.path().join("client");
        for dir in [&build, &remote, &client] {
            std::fs::create_dir_all(dir).expect("failed to create dir");
        }
        Self {
            temp_dir,
            build,
            remote,
            client,
        }
    }

    fn relsync(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_relsync"))
            .current_dir(self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env("RELSYNC_CHANNEL", "beta")
            .env("RELSYNC_RETRY_ATTEMPTS", "1")
            .env("XDG_DATA_HOME", self.temp_dir.path().join("data"))
            .args(args)
            .output()
            .expect("failed to run relsync")
    }

    fn package(&self, name: &str, content: &str) {
        std::fs::write(self.build.join(name), content).expect("failed to write package");
    }
}

fn path(p: &Path) -> &str {
    p.to_str().expect("temp paths are utf-8")
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.relsync(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.relsync(&["--version"]);
    assert!(output.status.success());
}

#[test]
fn test_upload_then_download() {
    let ctx = TestContext::new();
    ctx.package("MyApp-1.0.0-full.nupkg", "one");
    ctx.package("MyApp-2.0.0-full.nupkg", "two");

    let upload = ctx.relsync(&[
        "upload",
        "--dir",
        path(&ctx.build),
        "--target-dir",
        path(&ctx.remote),
    ]);
    assert!(upload.status.success(), "{}", String::from_utf8_lossy(&upload.stderr));
    assert!(ctx.remote.join("RELEASES-beta").is_file());
    assert!(ctx.remote.join("releases.beta.json").is_file());

    let download = ctx.relsync(&[
        "download",
        "--dir",
        path(&ctx.client),
        "--target-dir",
        path(&ctx.remote),
    ]);
    assert!(download.status.success(), "{}", String::from_utf8_lossy(&download.stderr));
    assert_eq!(
        std::fs::read_to_string(ctx.client.join("MyApp-2.0.0-full.nupkg")).unwrap(),
        "two"
    );
    assert!(ctx.client.join("RELEASES-beta").is_file());
}

#[test]
fn test_resolve_against_uploaded_index() {
    let ctx = TestContext::new();
    ctx.package("MyApp-1.0.0-full.nupkg", "one");
    ctx.package("MyApp-2.0.0-full.nupkg", "two");
    let upload = ctx.relsync(&[
        "upload",
        "--dir",
        path(&ctx.build),
        "--target-dir",
        path(&ctx.remote),
    ]);
    assert!(upload.status.success());

    let index = ctx.remote.join("RELEASES-beta");
    let output = ctx.relsync(&["resolve", "--index", path(&index), "--installed", "1.0.0"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MyApp-2.0.0-full.nupkg"));
}

#[test]
fn test_upload_without_remote_fails() {
    let ctx = TestContext::new();
    ctx.package("MyApp-1.0.0-full.nupkg", "one");
    let output = ctx.relsync(&["upload", "--dir", path(&ctx.build)]);
    assert!(!output.status.success());
}

#[test]
fn test_completions_command() {
    let ctx = TestContext::new();
    let output = ctx.relsync(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("relsync"));
}
