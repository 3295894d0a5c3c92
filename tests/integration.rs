use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Key variable that is never set, so credentials are always missing.
const UNSET_KEY_ENV: &str = "REPO_SIGHT_INTEGRATION_UNSET_KEY";

struct Fixture {
    _dir: tempfile::TempDir,
    config: PathBuf,
    repo: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::Builder::new().prefix("repo-sight").tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            format!(
                "[model]\napi_key_env = \"{UNSET_KEY_ENV}\"\n\n[cache]\nbackend = \"memory\"\n"
            ),
        )
        .unwrap();

        let repo = dir.path().join("web");
        write(&repo, "package.json", r#"{"name":"web","dependencies":{"react":"^18.2.0"}}"#);
        write(
            &repo,
            "src/auth/login.ts",
            "import { createSession } from './session';\n\nexport function login(user: string) {\n  return createSession(user);\n}\n",
        );
        write(
            &repo,
            "src/auth/session.ts",
            "export function createSession(user: string) {\n  return { user };\n}\n",
        );
        write(
            &repo,
            "src/cart/cart.ts",
            "export class Cart {\n  items: string[] = [];\n}\n",
        );
        Self {
            _dir: dir,
            config,
            repo,
        }
    }

    fn repo(&self) -> &str {
        self.repo.to_str().unwrap()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_repo-sight"));
        cmd.arg("--config")
            .arg(&self.config)
            .env_remove(UNSET_KEY_ENV)
            .env_remove("REPO_SIGHT_WORKSPACE");
        cmd
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("invalid JSON")
}

#[test]
fn doctor_returns_json() {
    let fx = Fixture::new();
    let output = fx.cmd().arg("doctor").output().expect("failed to run");
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["version"], PKG_VERSION);
    assert_eq!(json["config_found"], true);
    assert_eq!(json["model"]["api_key_env"], UNSET_KEY_ENV);
    assert_eq!(json["model"]["credentials_present"], false);
    assert_eq!(json["cache"]["backend"], "memory");
    assert!(json["languages"].as_array().unwrap().len() >= 13);
}

#[test]
fn init_writes_default_config() {
    let fx = Fixture::new();
    let target = fx.repo.join("nested").join("config.toml");
    let output = fx
        .cmd()
        .args(["init", "--path"])
        .arg(&target)
        .output()
        .expect("failed to run");
    assert!(output.status.success());
    assert!(target.exists());
    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("[generation]"));
    assert!(content.contains("quality_threshold = 0.8"));
}

#[test]
fn analyze_offline_uses_fallback_patterns() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--offline", "analyze", fx.repo()])
        .output()
        .expect("failed to run");
    assert!(output.status.success(), "stdout: {}", String::from_utf8_lossy(&output.stdout));

    let json = stdout_json(&output);
    let files: Vec<&str> = json["structure"]["files"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert!(files.contains(&"src/auth/login.ts"));
    assert!(files.contains(&"package.json"));
    assert_eq!(json["patterns"]["naming"]["functions"], "camelCase");
    assert!(json["search_index"]["files"]["src/auth/session.ts"].is_object());
}

#[test]
fn rank_offline_uses_lexical_signals() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--offline", "rank", fx.repo(), "login session", "--limit", "2"])
        .output()
        .expect("failed to run");
    assert!(output.status.success());

    let json = stdout_json(&output);
    let ranked = json.as_array().unwrap();
    assert_eq!(ranked.len(), 2);
    for file in ranked {
        let path = file["path"].as_str().unwrap();
        assert!(path.starts_with("src/auth/"), "unexpected file {path}");
        assert!(file["confidence"].as_f64().unwrap() > 0.0);
    }
    assert!(ranked[0]["score"].as_u64() >= ranked[1]["score"].as_u64());
}

#[test]
fn missing_credentials_is_configuration_error() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["analyze", fx.repo()])
        .output()
        .expect("failed to run");
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));

    let json = stdout_json(&output);
    assert_eq!(json["error"]["code"], "CONFIGURATION_ERROR");
    assert!(json["error"]["message"].as_str().unwrap().contains(UNSET_KEY_ENV));
}

#[test]
fn missing_repository_is_unavailable() {
    let fx = Fixture::new();
    let missing = fx.repo.join("does-not-exist");
    let output = fx
        .cmd()
        .args(["--offline", "analyze"])
        .arg(&missing)
        .output()
        .expect("failed to run");
    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["error"]["code"], "REPOSITORY_UNAVAILABLE");
    assert_eq!(json["error"]["phase"], "listing");
}

#[test]
fn generate_offline_fails_with_upstream_error() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--offline", "generate", fx.repo(), "Add a logout button"])
        .output()
        .expect("failed to run");
    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["error"]["code"], "UPSTREAM_MODEL_ERROR");
    assert_eq!(json["error"]["phase"], "generation");
    assert_eq!(json["error"]["repository"], fx.repo());
}

#[test]
fn session_ndjson() {
    let fx = Fixture::new();
    let mut child = fx
        .cmd()
        .args(["--offline", "session"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to spawn session");

    let stdin = child.stdin.as_mut().unwrap();
    let repo = serde_json::to_string(fx.repo()).unwrap();
    writeln!(stdin, r#"{{"command":"analyze","repository":{repo}}}"#).unwrap();
    writeln!(stdin).unwrap();
    writeln!(stdin, r#"{{"command":"rank","repository":{repo},"query":"cart","limit":3}}"#).unwrap();
    writeln!(stdin, "not json").unwrap();
    writeln!(stdin, r#"{{"command":"doctor"}}"#).unwrap();
    drop(child.stdin.take());

    let output = child.wait_with_output().expect("failed to wait");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .trim()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4, "Should have 4 NDJSON lines");

    assert!(lines[0]["structure"]["files"].is_array());
    assert_eq!(lines[1][0]["path"], "src/cart/cart.ts");
    assert_eq!(lines[2]["error"]["code"], "INVALID_REQUEST");
    assert_eq!(lines[3]["version"], PKG_VERSION);
}
