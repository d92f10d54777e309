//! 函数配置构建测试

use std::io::Write;

use flare_func_runtime::config::{ConfigBuilder, parse_static};
use flare_func_runtime::{ConfigError, RuntimeConfig};
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn static_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn environment_overrides_static_values() {
    let file = static_file("KEY=file_value\nONLY_FILE=kept\n");

    let config = assert_ok!(
        ConfigBuilder::new()
            .static_file(file.path())
            .environment([("KEY", "env_value"), ("ONLY_ENV", "set")])
            .build()
    );

    assert_eq!(config["KEY"], "env_value");
    assert_eq!(config["ONLY_FILE"], "kept");
    assert_eq!(config["ONLY_ENV"], "set");
}

#[test]
fn static_values_are_trimmed_and_unquoted() {
    let config = parse_static("  NAME =  \"quoted value\"  \n\n\nPLAIN=  x  \nEMPTY=\n").unwrap();

    assert_eq!(config["NAME"], "quoted value");
    assert_eq!(config["PLAIN"], "x");
    assert_eq!(config["EMPTY"], "");
    assert_eq!(config.len(), 3);
}

#[test]
fn value_may_contain_equals_sign() {
    let config = parse_static("URL=postgres://u:p@host/db?sslmode=disable").unwrap();
    assert_eq!(config["URL"], "postgres://u:p@host/db?sslmode=disable");
}

#[test]
fn malformed_line_fails_whole_build() {
    let file = static_file("GOOD=1\nthis line has no separator\n");

    let err = assert_err!(
        ConfigBuilder::new()
            .static_file(file.path())
            .environment(Vec::<(String, String)>::new())
            .build()
    );

    match err {
        ConfigError::MalformedLine { line, content } => {
            assert_eq!(line, 2);
            assert_eq!(content, "this line has no separator");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_static_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();

    let config = ConfigBuilder::new()
        .static_file(dir.path().join("cfg"))
        .environment([("A", "1")])
        .build()
        .unwrap();

    assert_eq!(config.len(), 1);
    assert_eq!(config["A"], "1");
}

#[test]
fn process_environment_is_included_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .static_file(dir.path().join("cfg"))
        .build()
        .unwrap();

    for (key, value) in std::env::vars() {
        assert_eq!(config.get(&key), Some(&value), "missing {key}");
    }
}

#[test]
fn runtime_config_loads_from_toml() {
    let file = static_file(
        "shutdown_timeout_secs = 3\nlisten_address = \"0.0.0.0:9090\"\nhandle_signals = false\n",
    );

    let config = RuntimeConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.shutdown_timeout.as_secs(), 3);
    assert_eq!(config.stop_timeout.as_secs(), 30);
    assert_eq!(config.listen_address, "0.0.0.0:9090");
    assert!(!config.handle_signals);
}

#[test]
fn runtime_config_rejects_bad_toml() {
    let file = static_file("shutdown_timeout_secs = \"soon\"\n");
    assert_err!(RuntimeConfig::load_from_file(file.path()));
}
