use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 8] = [
    "GANTRY_CONFIG",
    "GANTRY_TIMEOUT_MS",
    "GANTRY_MAX_BUFFER_BYTES",
    "GANTRY_MAX_OUTPUT_LINES",
    "GANTRY_ALLOWED_COMMANDS",
    "GANTRY_ALLOWED_ROOTS",
    "GANTRY_COMPACT_RATIO",
    "GANTRY_LAZY_TOOLS",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.runner.timeout_ms, 30_000);
    assert_eq!(config.runner.max_buffer_bytes, 10 * 1024 * 1024);
    assert_eq!(config.runner.kill_grace_ms, 2_000);
    assert!(config.policy.allowed_commands.is_empty());
    assert!(config.policy.roots.is_empty());
    assert!((config.output.compact_ratio - 1.0).abs() < f64::EPSILON);
    assert_eq!(config.output.max_text_bytes, 30_000);
    assert!(!config.tools.lazy);
}

#[test]
#[serial]
fn defaults_when_file_missing() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("missing.toml")).unwrap();
    assert_eq!(config.runner.timeout_ms, 30_000);
    assert!(config.policy.allowed_commands.is_empty());
}

#[test]
#[serial]
fn parse_full_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[runner]
timeout_ms = 5000
max_output_lines = 400
kill_signal = "SIGINT"
kill_grace_ms = 500

[policy]
allowed_commands = ["git", "docker"]

[policy.roots]
workdir = ["/srv/projects"]

[output]
compact_ratio = 1.5

[tools]
lazy = true
core = ["git-status"]
disabled = ["docker-run"]
"#
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.runner.timeout_ms, 5000);
    assert_eq!(config.runner.max_output_lines, Some(400));
    assert_eq!(config.runner.kill_signal, gantry_runner::KillSignal::Int);
    assert_eq!(config.runner.kill_grace_ms, 500);
    assert_eq!(config.policy.allowed_commands, vec!["git", "docker"]);
    assert_eq!(
        config.policy.roots["workdir"],
        vec![PathBuf::from("/srv/projects")]
    );
    assert!((config.output.compact_ratio - 1.5).abs() < f64::EPSILON);
    assert_eq!(config.output.max_text_bytes, 30_000);
    assert!(config.tools.lazy);
}

#[test]
#[serial]
fn invalid_toml_is_parse_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[runner\ntimeout_ms = ").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("bad.toml"));
}

#[test]
#[serial]
fn env_overrides_runner() {
    clear_env();
    unsafe {
        std::env::set_var("GANTRY_TIMEOUT_MS", "1500");
        std::env::set_var("GANTRY_MAX_BUFFER_BYTES", "4096");
        std::env::set_var("GANTRY_MAX_OUTPUT_LINES", "10");
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();
    assert_eq!(config.runner.timeout_ms, 1500);
    assert_eq!(config.runner.max_buffer_bytes, 4096);
    assert_eq!(config.runner.max_output_lines, Some(10));
}

#[test]
#[serial]
fn env_invalid_values_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("GANTRY_TIMEOUT_MS", "0");
        std::env::set_var("GANTRY_MAX_BUFFER_BYTES", "lots");
        std::env::set_var("GANTRY_COMPACT_RATIO", "-2");
        std::env::set_var("GANTRY_LAZY_TOOLS", "maybe");
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();
    assert_eq!(config.runner.timeout_ms, 30_000);
    assert_eq!(config.runner.max_buffer_bytes, 10 * 1024 * 1024);
    assert!((config.output.compact_ratio - 1.0).abs() < f64::EPSILON);
    assert!(!config.tools.lazy);
}

#[test]
#[serial]
fn env_overrides_policy_and_tools() {
    clear_env();
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let roots = std::env::join_paths([a.path(), b.path()]).unwrap();
    unsafe {
        std::env::set_var("GANTRY_ALLOWED_COMMANDS", "git, npm,,kubectl ");
        std::env::set_var("GANTRY_ALLOWED_ROOTS", &roots);
        std::env::set_var("GANTRY_COMPACT_RATIO", "2.5");
        std::env::set_var("GANTRY_LAZY_TOOLS", "true");
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.policy.allowed_commands, vec!["git", "npm", "kubectl"]);
    assert_eq!(
        config.policy.roots[gantry_policy::WORKDIR_POLICY],
        vec![a.path().to_path_buf(), b.path().to_path_buf()]
    );
    assert!((config.output.compact_ratio - 2.5).abs() < f64::EPSILON);
    assert!(config.tools.lazy);

    let guard = config.policy.guard();
    assert!(guard.check_program("npm").is_ok());
    assert!(guard.check_program("rm").is_err());
    assert!(guard.check_workdir(a.path()).is_ok());
}

#[test]
#[serial]
fn gantry_config_env_sets_default_path() {
    clear_env();
    unsafe { std::env::set_var("GANTRY_CONFIG", "/tmp/custom-gantry.toml") };
    let path = Config::default_path();
    clear_env();
    assert_eq!(path, Some(PathBuf::from("/tmp/custom-gantry.toml")));
}

#[test]
fn tool_filter_uses_lists() {
    let config = Config {
        tools: ToolsConfig {
            lazy: true,
            core: vec!["git-status".into()],
            disabled: vec!["ssh-exec".into()],
        },
        ..Config::default()
    };
    assert!(config.should_register_tool("git-status"));
    assert!(!config.should_register_tool("ssh-exec"));
    assert!(config.is_core_tool("git-status"));
    assert!(!config.is_core_tool("docker-run"));
}

#[test]
fn toml_round_trip_of_defaults() {
    let text = Config::default().to_toml().unwrap();
    assert!(text.contains("[runner]"));
    assert!(text.contains("kill_signal = \"SIGTERM\""));
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed.runner.timeout_ms, 30_000);
}
