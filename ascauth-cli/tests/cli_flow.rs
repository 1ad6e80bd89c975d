//! End-to-end tests for the `ascauth` binary.
//!
//! Every invocation runs with an isolated per-user config path, the
//! keychain bypassed and a working directory without a local config.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use p256::SecretKey;
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use predicates::prelude::*;
use rand::rngs::OsRng;
use serde_json::Value;
use tempfile::TempDir;

const ASC_VARS: [&str; 11] = [
    "ASC_KEY_ID",
    "ASC_ISSUER_ID",
    "ASC_PRIVATE_KEY_PATH",
    "ASC_PRIVATE_KEY",
    "ASC_PRIVATE_KEY_B64",
    "ASC_PROFILE",
    "ASC_STRICT_AUTH",
    "ASC_BYPASS_KEYCHAIN",
    "ASC_CONFIG_PATH",
    "ASC_BASE_URL",
    "ASC_TIMEOUT",
];

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("repo")).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("home/.asc/config.json")
    }

    fn write_key(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        let pem = SecretKey::random(&mut OsRng)
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap();
        std::fs::write(&path, pem.as_bytes()).unwrap();
        path
    }

    /// `ascauth` with a clean, isolated environment.
    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("ascauth");
        for var in ASC_VARS {
            cmd.env_remove(var);
        }
        cmd.current_dir(self.dir.path().join("repo"))
            .env("HOME", self.dir.path().join("home"))
            .env("ASC_CONFIG_PATH", self.config_path())
            .env("ASC_BYPASS_KEYCHAIN", "1");
        cmd
    }

    fn login(&self, name: &str, key_id: &str, key: &Path) {
        self.cmd()
            .args(["login", "--name", name, "--key-id", key_id])
            .args(["--issuer-id", "I1", "--private-key"])
            .arg(key)
            .assert()
            .success();
    }

    fn status(&self) -> Value {
        let output = self
            .cmd()
            .args(["status", "--output", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn names_and_defaults(status: &Value) -> Vec<(String, bool)> {
    status["credentials"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| {
            (
                c["name"].as_str().unwrap().to_string(),
                c["is_default"].as_bool().unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_full_credential_lifecycle() {
    let sandbox = Sandbox::new();
    let key = sandbox.write_key("AuthKey.p8");

    sandbox.cmd().arg("init").assert().success();
    let config = sandbox.config_path();
    assert!(config.is_file());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&config).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&config).unwrap()).unwrap();
    assert_eq!(doc["keys"], Value::Array(vec![]));
    assert!(doc.get("default_key_name").is_none());

    sandbox.login("A", "K1", &key);
    assert_eq!(names_and_defaults(&sandbox.status()), vec![("A".to_string(), true)]);

    sandbox.login("B", "K2", &key);
    assert_eq!(
        names_and_defaults(&sandbox.status()),
        vec![("A".to_string(), true), ("B".to_string(), false)]
    );

    sandbox.cmd().args(["switch", "--name", "B"]).assert().success();
    assert_eq!(
        names_and_defaults(&sandbox.status()),
        vec![("A".to_string(), false), ("B".to_string(), true)]
    );

    sandbox.cmd().args(["logout", "--name", "A"]).assert().success();
    assert_eq!(names_and_defaults(&sandbox.status()), vec![("B".to_string(), true)]);

    sandbox.cmd().args(["logout", "--all"]).assert().success();
    assert!(names_and_defaults(&sandbox.status()).is_empty());

    sandbox
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No credentials stored"));
}

#[test]
fn test_init_twice_is_conflict() {
    let sandbox = Sandbox::new();
    sandbox.cmd().arg("init").assert().success();
    sandbox.cmd().arg("init").assert().code(5);
    sandbox.cmd().args(["init", "--force"]).assert().success();
}

#[test]
fn test_duplicate_login_is_conflict() {
    let sandbox = Sandbox::new();
    let key = sandbox.write_key("AuthKey.p8");
    sandbox.login("A", "K1", &key);

    sandbox
        .cmd()
        .args(["login", "--name", "A", "--key-id", "K9", "--issuer-id", "I9"])
        .arg("--private-key")
        .arg(&key)
        .assert()
        .code(5);
}

#[test]
fn test_login_with_invalid_key_stores_nothing() {
    let sandbox = Sandbox::new();
    let bad = sandbox.dir.path().join("bad.p8");
    std::fs::write(&bad, "not a key").unwrap();

    sandbox
        .cmd()
        .args(["login", "--name", "A", "--key-id", "K1", "--issuer-id", "I1"])
        .arg("--private-key")
        .arg(&bad)
        .assert()
        .code(3);
    assert!(!sandbox.config_path().exists());
}

#[test]
fn test_switch_and_logout_unknown_name_not_found() {
    let sandbox = Sandbox::new();
    sandbox.cmd().arg("init").assert().success();

    sandbox.cmd().args(["switch", "--name", "ghost"]).assert().code(4);
    sandbox.cmd().args(["logout", "--name", "ghost"]).assert().code(4);
    sandbox.cmd().args(["logout", "--all"]).assert().success();
}

#[test]
fn test_logout_requires_name_or_all() {
    let sandbox = Sandbox::new();
    sandbox.cmd().arg("logout").assert().code(2);
}

#[test]
fn test_validate_prints_result_and_signals_auth_failure() {
    let sandbox = Sandbox::new();

    let output = sandbox
        .cmd()
        .args(["validate", "--output", "json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["valid"], Value::Bool(false));
    assert!(
        result["error"]
            .as_str()
            .unwrap()
            .contains("incomplete credentials")
    );
}

#[test]
fn test_validate_with_stored_credential() {
    let sandbox = Sandbox::new();
    let key = sandbox.write_key("AuthKey.p8");
    sandbox.login("A", "K1", &key);

    let output = sandbox
        .cmd()
        .args(["validate", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["valid"], Value::Bool(true));
    assert_eq!(result["profile"], "A");
    assert_eq!(result["network"], "skipped");
}

#[test]
fn test_unknown_profile_flag_is_auth_failure() {
    let sandbox = Sandbox::new();
    let key = sandbox.write_key("AuthKey.p8");
    sandbox.login("A", "K1", &key);

    sandbox
        .cmd()
        .args(["validate", "--profile", "ghost"])
        .env("ASC_KEY_ID", "K2")
        .env("ASC_ISSUER_ID", "I2")
        .env("ASC_PRIVATE_KEY_PATH", &key)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("profile 'ghost' not found"));
}

#[test]
fn test_strict_auth_rejects_mixed_sources() {
    let sandbox = Sandbox::new();
    let key = sandbox.write_key("AuthKey.p8");
    std::fs::create_dir_all(sandbox.config_path().parent().unwrap()).unwrap();
    std::fs::write(
        sandbox.config_path(),
        r#"{"default_key_name":"A","keys":[{"name":"A","key_id":"K1","issuer_id":"I1","private_key_path":""}]}"#,
    )
    .unwrap();

    sandbox
        .cmd()
        .arg("validate")
        .env("ASC_PRIVATE_KEY_PATH", &key)
        .assert()
        .success();

    sandbox
        .cmd()
        .args(["validate", "--strict-auth"])
        .env("ASC_PRIVATE_KEY_PATH", &key)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("mixed credential sources"));
}

#[test]
fn test_doctor_fix_requires_confirm() {
    let sandbox = Sandbox::new();
    sandbox.cmd().args(["doctor", "--fix"]).assert().code(2);
}

#[cfg(unix)]
#[test]
fn test_doctor_fix_repairs_config_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let sandbox = Sandbox::new();
    let key = sandbox.write_key("AuthKey.p8");
    std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o600)).unwrap();
    sandbox.login("A", "K1", &key);
    let config = sandbox.config_path();
    std::fs::set_permissions(&config, std::fs::Permissions::from_mode(0o644)).unwrap();
    let before = std::fs::read(&config).unwrap();

    sandbox
        .cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("[WARN] global config permissions"));

    sandbox
        .cmd()
        .args(["doctor", "--fix", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("After fixes:"))
        .stdout(predicate::str::contains("[OK  ] global config permissions"));

    let mode = std::fs::metadata(&config).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
    assert_eq!(std::fs::read(&config).unwrap(), before);
}

#[test]
fn test_doctor_failure_exit_code() {
    let sandbox = Sandbox::new();
    let key = sandbox.write_key("AuthKey.p8");
    sandbox.login("A", "K1", &key);
    std::fs::remove_file(&key).unwrap();

    sandbox
        .cmd()
        .arg("doctor")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Key files"))
        .stdout(predicate::str::contains("[FAIL]"));
}

#[cfg(unix)]
fn inline_key_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("asc-key-"))
        .collect()
}

#[cfg(unix)]
fn inline_key_cmd(sandbox: &Sandbox, tmp: &Path) -> Command {
    use base64::Engine;

    let pem = SecretKey::random(&mut OsRng)
        .to_pkcs8_pem(LineEnding::LF)
        .unwrap();
    let mut cmd = sandbox.cmd();
    cmd.env("TMPDIR", tmp)
        .env("ASC_KEY_ID", "K1")
        .env("ASC_ISSUER_ID", "I1")
        .env(
            "ASC_PRIVATE_KEY_B64",
            base64::engine::general_purpose::STANDARD.encode(pem.as_bytes()),
        );
    cmd
}

#[cfg(unix)]
#[test]
fn test_inline_key_file_removed_after_success() {
    let sandbox = Sandbox::new();
    let tmp = sandbox.dir.path().join("tmp");
    std::fs::create_dir_all(&tmp).unwrap();

    let output = inline_key_cmd(&sandbox, &tmp)
        .args(["validate", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    let key_path = PathBuf::from(result["key_path"].as_str().unwrap());
    assert!(key_path.starts_with(&tmp));
    assert!(!key_path.exists());
    assert!(inline_key_files(&tmp).is_empty());
}

#[cfg(unix)]
#[test]
fn test_inline_key_file_removed_after_failure() {
    let sandbox = Sandbox::new();
    let tmp = sandbox.dir.path().join("tmp");
    std::fs::create_dir_all(&tmp).unwrap();

    let output = inline_key_cmd(&sandbox, &tmp)
        .args(["validate", "--network", "--output", "json"])
        .env("ASC_BASE_URL", "http://127.0.0.1:9")
        .env("ASC_TIMEOUT", "2s")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["network"], "failed");
    let key_path = PathBuf::from(result["key_path"].as_str().unwrap());
    assert!(key_path.starts_with(&tmp));
    assert!(!key_path.exists());
    assert!(inline_key_files(&tmp).is_empty());
}
