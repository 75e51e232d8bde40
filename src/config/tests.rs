use super::*;

fn raw_with_peers(addresses: &[(&str, &str)]) -> RawSettings {
    let mut raw = RawSettings::default();
    raw.peers.targets = addresses
        .iter()
        .map(|(name, address)| RawPeerTarget {
            name: Some(name.to_string()),
            address: address.to_string(),
        })
        .collect();
    raw
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_deployed_service() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.max_body_bytes.get(), 100 * 1024 * 1024);
    assert_eq!(settings.engine.navigation_timeout, Duration::from_secs(120));
    assert_eq!(settings.engine.shutdown_timeout, Duration::from_secs(10));
    assert_eq!(settings.engine.max_concurrent_pages.get(), 4);
    assert_eq!(settings.engine.load_policy, LoadPolicy::Load);
    assert_eq!(settings.engine.paper_format, PaperFormat::A4);
    assert_eq!(settings.engine.image_max_width, "800px");
    assert!(settings.engine.headless);
    assert!(
        settings
            .engine
            .args
            .iter()
            .any(|arg| arg == "--disable-dev-shm-usage")
    );
    assert_eq!(settings.dispatch.job_deadline, Duration::from_secs(300));
    assert_eq!(settings.heartbeat.interval, Duration::from_secs(600));
    assert!(settings.heartbeat.target.is_none());
}

#[test]
fn targets_list_local_first_then_peers_in_order() {
    let raw = raw_with_peers(&[
        ("east", "http://east.internal:3000/generate-pdf"),
        ("west", "https://west.internal/generate-pdf"),
    ]);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let names: Vec<_> = settings
        .targets()
        .iter()
        .map(|target| target.name().to_string())
        .collect();
    assert_eq!(names, vec!["local", "east", "west"]);
}

#[test]
fn excluding_local_without_peers_is_rejected() {
    let mut raw = RawSettings::default();
    raw.dispatch.include_local = Some(false);

    let err = Settings::from_raw(raw).expect_err("no targets");
    assert!(matches!(err, LoadError::Invalid { key: "peers.targets", .. }));
}

#[test]
fn peers_only_configuration_is_accepted() {
    let mut raw = raw_with_peers(&[("east", "http://east.internal/generate-pdf")]);
    raw.dispatch.include_local = Some(false);

    let settings = Settings::from_raw(raw).expect("valid settings");
    let targets = settings.targets();
    assert_eq!(targets.len(), 1);
    assert!(!targets[0].is_local());
}

#[test]
fn peer_named_local_is_rejected() {
    let raw = raw_with_peers(&[("local", "http://other.internal/generate-pdf")]);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn duplicate_peer_names_are_rejected() {
    let raw = raw_with_peers(&[
        ("east", "http://a.internal/generate-pdf"),
        ("east", "http://b.internal/generate-pdf"),
    ]);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn peer_name_defaults_to_host() {
    let mut raw = RawSettings::default();
    raw.peers.targets = vec![RawPeerTarget {
        name: None,
        address: "http://render-2.internal:8080/generate-pdf".to_string(),
    }];

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.peers.targets[0].name, "render-2.internal");
}

#[test]
fn non_http_peer_address_is_rejected() {
    let raw = raw_with_peers(&[("ftp", "ftp://files.internal/generate-pdf")]);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut raw = RawSettings::default();
    raw.engine.navigation_timeout_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.dispatch.job_deadline_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn unknown_load_policy_is_rejected() {
    let mut raw = RawSettings::default();
    raw.engine.load_policy = Some("domcontentloaded".to_string());

    let err = Settings::from_raw(raw).expect_err("bad policy");
    assert!(matches!(err, LoadError::Invalid { key: "engine.load_policy", .. }));
}

#[test]
fn explicit_empty_args_disable_default_flags() {
    let mut raw = RawSettings::default();
    raw.engine.args = Some(Vec::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.engine.args.is_empty());
}

#[test]
fn engine_settings_map_onto_engine_config() {
    let mut raw = RawSettings::default();
    raw.engine.max_concurrent_pages = Some(2);
    raw.engine.paper_format = Some("letter".to_string());
    raw.engine.image_max_width = Some("640px".to_string());
    raw.engine.load_policy = Some("network-idle".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    let config = LocalEngineConfig::from(&settings.engine);

    assert_eq!(config.max_concurrent_pages, 2);
    assert_eq!(config.capture.paper, PaperFormat::Letter);
    assert!(config.capture.print_background);
    assert_eq!(config.transform.max_width(), "640px");
    assert_eq!(config.load_policy, LoadPolicy::NetworkIdle);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["printrelay"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "printrelay",
        "serve",
        "--server-host",
        "127.0.0.1",
        "--engine-load-policy",
        "network-idle",
        "--dispatch-include-local",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
            assert_eq!(
                serve.overrides.engine.load_policy.as_deref(),
                Some("network-idle")
            );
            assert_eq!(serve.overrides.engine.include_local, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "printrelay",
        "render",
        "/tmp/invoice.html",
        "--output",
        "/tmp/invoice.pdf",
        "--filename",
        "invoice.pdf",
    ]);

    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.file, std::path::Path::new("/tmp/invoice.html"));
            assert_eq!(
                render.output.as_deref(),
                Some(std::path::Path::new("/tmp/invoice.pdf"))
            );
            assert_eq!(render.filename.as_deref(), Some("invoice.pdf"));
        }
        _ => panic!("wrong command parsed"),
    }
}
