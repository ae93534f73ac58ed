use std::time::Duration;
use std::{env, fs};

use geoproxy_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("geoproxy.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
worker_count = 2

[auth]
basic_user = "ops"
basic_pass = "s3cret"
jwt_key = "signing-key"
token_lifetime = "10m"

[redis]
enabled = false

[cache]
ttl_secs = 120

[upstreams.nominatim]
url = "http://localhost:7070/"

[upstreams.photon]
url = "http://localhost:2322"
timeout_ms = 2500

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.worker_count(), 2);
    assert_eq!(cfg.auth.basic_user, "ops");
    assert_eq!(cfg.auth.token_lifetime, Duration::from_secs(600));
    assert!(!cfg.redis.enabled);
    assert_eq!(cfg.cache_ttl(), Duration::from_secs(120));
    assert_eq!(cfg.upstreams.len(), 2);
    assert_eq!(cfg.upstreams["photon"].timeout(), Duration::from_millis(2500));
    assert_eq!(cfg.upstreams["nominatim"].timeout_ms, 1000);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");

    // 2) Env override should win over file
    unsafe {
        env::set_var("GEOPROXY__CACHE__TTL_SECS", "30");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.ttl_secs, 30);
    // cleanup env var
    unsafe {
        env::remove_var("GEOPROXY__CACHE__TTL_SECS");
    }

    // 3) Invalid config (reserved upstream name) should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[upstreams.geotz]
url = "http://localhost:9000/"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("reserved"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.server.port, 3000);
    assert!(cfg.upstreams.contains_key("nominatim"));
    assert!(cfg.upstreams.contains_key("osrm"));
    assert_eq!(cfg.auth.jwt_issuer, "iss");
}
