use std::{fs, sync::Arc, time::Duration};

use referrer_config::{ConfigLoadError, ConfigLoader, ConfigSource, ResolverConfig};
use referrer_core::{
    ReferrerError, ReferrerResolver,
    port::scripted::{CompletionScript, PayloadScript, ScriptedConnector},
};
use referrer_model::AttributionPayload;
use tempfile::TempDir;

#[test]
fn explicit_toml_path_wins() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("custom.toml");
    fs::write(&path, "request_timeout = \"750ms\"\n").expect("write config");
    fs::write(dir.path().join("referrer.json"), r#"{"request_timeout":"9s"}"#)
        .expect("write default file");

    let load = ConfigLoader::default()
        .with_path(&path)
        .with_inline_json(r#"{"request_timeout":"1s"}"#)
        .with_search_root(dir.path())
        .load()
        .expect("load config");

    assert_eq!(load.source, ConfigSource::EnvPath(path));
    assert_eq!(load.config.request_timeout, Some(Duration::from_millis(750)));
}

#[test]
fn inline_json_beats_default_file() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("referrer.toml"), "request_timeout = \"9s\"\n")
        .expect("write default file");

    let load = ConfigLoader::default()
        .with_inline_json(r#"{"request_timeout":"2s"}"#)
        .with_search_root(dir.path())
        .load()
        .expect("load config");

    assert_eq!(load.source, ConfigSource::EnvInline);
    assert_eq!(load.config.request_timeout, Some(Duration::from_secs(2)));
}

#[test]
fn default_file_is_discovered_under_search_root() {
    let dir = TempDir::new().expect("temp dir");
    fs::create_dir_all(dir.path().join("config")).expect("config dir");
    let path = dir.path().join("config/referrer.toml");
    fs::write(&path, "request_timeout = \"4s\"\n").expect("write config");

    let load = ConfigLoader::default()
        .with_search_root(dir.path())
        .load()
        .expect("load config");

    assert_eq!(load.source, ConfigSource::File(path));
    assert_eq!(load.config.request_timeout, Some(Duration::from_secs(4)));
}

#[test]
fn falls_back_to_defaults() {
    let dir = TempDir::new().expect("temp dir");

    let load = ConfigLoader::default()
        .with_search_root(dir.path())
        .load()
        .expect("load config");

    assert_eq!(load.source, ConfigSource::Default);
    assert_eq!(load.config, ResolverConfig::default());
}

#[test]
fn missing_explicit_file_is_a_read_error() {
    let dir = TempDir::new().expect("temp dir");
    let err = ConfigLoader::default()
        .with_path(dir.path().join("absent.toml"))
        .load()
        .expect_err("missing file");

    assert!(matches!(err, ConfigLoadError::Read { .. }));
}

#[tokio::test]
async fn loaded_timeout_applies_to_resolver() {
    let load = ConfigLoader::default()
        .with_inline_json(r#"{"request_timeout":"10ms"}"#)
        .load()
        .expect("load config");
    let connector = Arc::new(ScriptedConnector::new(
        CompletionScript::Silent,
        PayloadScript::Payload(AttributionPayload::default()),
    ));
    let resolver = ReferrerResolver::with_config(connector, load.config);

    let err = resolver.get_attribution().await.expect_err("silent service");
    assert_eq!(err, ReferrerError::TimedOut(Duration::from_millis(10)));
}
