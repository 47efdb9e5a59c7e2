use super::*;

#[test]
fn defaults_bind_to_loopback() {
    let cfg = Config::default();
    assert!(cfg.bind_addr.ip().is_loopback());
    assert_eq!(cfg.web_port, 7777);
}

#[test]
fn insights_default_to_disabled() {
    let cfg = Config::default();
    assert!(!cfg.insights.enabled);
    assert_eq!(cfg.insights.provider, "anthropic");
}

#[test]
fn file_config_parses_partial_toml() {
    let toml = r#"
        web_port = 9000

        [insights]
        enabled = true
        provider = "openai"

        [logging]
        level = "debug"
    "#;
    let parsed: FileConfig = toml::from_str(toml).unwrap();
    assert_eq!(parsed.web_port, Some(9000));
    assert_eq!(parsed.insights.unwrap().provider.as_deref(), Some("openai"));
    assert_eq!(parsed.logging.unwrap().level.as_deref(), Some("debug"));
}
