use super::*;
use crate::model::{MainRoute, RoutingConfig, ServiceRoute, StackConfig};
use indexmap::IndexMap;
use tempfile::TempDir;

fn routed_config() -> StackConfig {
    StackConfig {
        name: "blog".to_string(),
        use_routing: true,
        domain: Some("example.com".to_string()),
        subdomain: Some("Blog".to_string()),
        port: 18080,
        ..Default::default()
    }
}

fn transform(manifest: &str, config: &StackConfig) -> (TransformOutput, Value) {
    let dir = TempDir::new().unwrap();
    let output = ManifestTransformer::default()
        .transform(manifest, config, dir.path())
        .unwrap();
    let parsed: Value = serde_yaml::from_str(&output.manifest).unwrap();
    (output, parsed)
}

fn label<'a>(doc: &'a Value, service: &str, key: &str) -> Option<&'a str> {
    doc["services"][service]["labels"][key].as_str()
}

fn service_port(doc: &Value, router: &str, service: &str) -> Option<String> {
    label(
        doc,
        service,
        &format!("traefik.http.services.{}.loadbalancer.server.port", router),
    )
    .map(str::to_string)
}

#[test]
fn test_routing_uses_declared_container_port() {
    let manifest = r#"
services:
  web:
    image: nginx:alpine
    ports:
      - "8080:80"
"#;
    let (output, doc) = transform(manifest, &routed_config());
    assert!(output.structured);

    assert_eq!(service_port(&doc, "blog-web", "web").as_deref(), Some("80"));
    assert_eq!(
        label(&doc, "web", "traefik.http.routers.blog-web.rule"),
        Some("Host(`web.Blog.example.com`)")
    );
    assert_eq!(
        label(&doc, "web", "traefik.http.routers.blog-web.tls"),
        Some("true")
    );
    assert_eq!(label(&doc, "web", "traefik.enable"), Some("true"));
}

#[test]
fn test_explicit_internal_port_wins_over_port_mapping() {
    let manifest = r#"
services:
  svc:
    image: example/app
    ports:
      - "8080:80"
"#;
    let mut config = routed_config();
    config.routing_config.services.insert(
        "svc".to_string(),
        ServiceRoute {
            internal_port: Some(9000),
            enabled: true,
        },
    );

    let (_, doc) = transform(manifest, &config);
    assert_eq!(service_port(&doc, "blog-svc", "svc").as_deref(), Some("9000"));
}

#[test]
fn test_structured_port_and_expose_fallbacks() {
    let manifest = r#"
services:
  api:
    image: example/api
    ports:
      - target: 3000
        published: 13000
  worker:
    image: example/worker
    expose:
      - "7000"
      - "7001"
  legacy:
    image: example/legacy
    ports:
      - container: 5000
"#;
    let (_, doc) = transform(manifest, &routed_config());
    assert_eq!(service_port(&doc, "blog-api", "api").as_deref(), Some("3000"));
    assert_eq!(
        service_port(&doc, "blog-worker", "worker").as_deref(),
        Some("7000")
    );
    assert_eq!(
        service_port(&doc, "blog-legacy", "legacy").as_deref(),
        Some("5000")
    );
}

#[test]
fn test_first_port_mapping_is_authoritative() {
    let manifest = r#"
services:
  app:
    image: example/app
    ports:
      - "127.0.0.1:9229:9229"
      - "8080:3000/tcp"
"#;
    let (_, doc) = transform(manifest, &routed_config());
    assert_eq!(service_port(&doc, "blog-app", "app").as_deref(), Some("9229"));
}

#[test]
fn test_caller_port_is_last_resort() {
    let manifest = r#"
services:
  app:
    image: example/app
"#;
    let (_, doc) = transform(manifest, &routed_config());
    assert_eq!(service_port(&doc, "blog-app", "app").as_deref(), Some("18080"));
}

#[test]
fn test_database_services_are_not_routed() {
    let manifest = r#"
services:
  web:
    image: example/web
    ports: ["80"]
  postgres:
    image: postgres:16
  app-db:
    image: mariadb
"#;
    let (_, doc) = transform(manifest, &routed_config());
    assert!(doc["services"]["postgres"]["labels"].is_null());
    assert!(doc["services"]["app-db"]["labels"].is_null());
    assert!(doc["services"]["postgres"]["networks"].is_null());
    assert!(label(&doc, "web", "traefik.enable").is_some());
}

#[test]
fn test_database_service_with_explicit_entry_is_routed() {
    let manifest = r#"
services:
  mongo-express:
    image: mongo-express
"#;
    let mut config = routed_config();
    config.routing_config.services.insert(
        "mongo-express".to_string(),
        ServiceRoute {
            internal_port: Some(8081),
            enabled: true,
        },
    );
    let (_, doc) = transform(manifest, &config);
    assert_eq!(
        service_port(&doc, "blog-mongo-express", "mongo-express").as_deref(),
        Some("8081")
    );
}

#[test]
fn test_disabled_service_is_skipped() {
    let manifest = r#"
services:
  admin:
    image: example/admin
    ports: ["8000:8000"]
"#;
    let mut config = routed_config();
    config.routing_config.services.insert(
        "admin".to_string(),
        ServiceRoute {
            internal_port: None,
            enabled: false,
        },
    );
    let (_, doc) = transform(manifest, &config);
    assert!(doc["services"]["admin"]["labels"].is_null());
    assert!(doc["networks"].is_null());
}

#[test]
fn test_main_route_adds_top_level_host() {
    let manifest = r#"
services:
  frontend:
    image: example/frontend
    ports: ["3000:3000"]
  backend:
    image: example/backend
    expose: [4000]
"#;
    let mut config = routed_config();
    config.routing_config = RoutingConfig {
        main: Some(MainRoute {
            service_name: Some("frontend".to_string()),
            internal_port: Some(3000),
        }),
        services: IndexMap::new(),
    };

    let (_, doc) = transform(manifest, &config);
    assert_eq!(
        label(&doc, "frontend", "traefik.http.routers.blog.rule"),
        Some("Host(`Blog.example.com`)")
    );
    assert_eq!(service_port(&doc, "blog", "frontend").as_deref(), Some("3000"));
    assert!(label(&doc, "backend", "traefik.http.routers.blog.rule").is_none());
    assert_eq!(
        service_port(&doc, "blog-backend", "backend").as_deref(),
        Some("4000")
    );
}

#[test]
fn test_routing_network_attached_and_declared() {
    let manifest = r#"
services:
  web:
    image: nginx
    networks:
      - internal
  api:
    image: example/api
    networks:
      internal:
        aliases: [api]
  cache:
    image: redis
networks:
  internal: {}
"#;
    let (_, doc) = transform(manifest, &routed_config());

    let web_networks: Vec<_> = doc["services"]["web"]["networks"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(web_networks, vec!["internal", "stackpilot-public"]);

    assert!(
        doc["services"]["api"]["networks"]
            .as_mapping()
            .unwrap()
            .contains_key("stackpilot-public")
    );

    let cache_networks: Vec<_> = doc["services"]["cache"]["networks"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(cache_networks, vec!["default", "stackpilot-public"]);

    assert_eq!(
        doc["networks"]["stackpilot-public"]["external"].as_bool(),
        Some(true)
    );
    assert!(doc["networks"]["internal"].is_mapping());
}

#[test]
fn test_existing_network_declaration_is_kept() {
    let manifest = r#"
services:
  web:
    image: nginx
    ports: ["80"]
networks:
  stackpilot-public:
    external: true
    name: stackpilot-public
"#;
    let (_, doc) = transform(manifest, &routed_config());
    assert_eq!(
        doc["networks"]["stackpilot-public"]["name"].as_str(),
        Some("stackpilot-public")
    );
}

#[test]
fn test_routing_skipped_without_domain() {
    let manifest = "services:\n  web:\n    image: nginx\n";
    let mut config = routed_config();
    config.domain = None;
    let (_, doc) = transform(manifest, &config);
    assert!(doc["services"]["web"]["labels"].is_null());
}

#[test]
fn test_list_labels_are_normalized() {
    let manifest = r#"
services:
  web:
    image: nginx
    ports: ["80"]
    labels:
      - "com.example.team=blog"
      - "com.example.public"
"#;
    let (_, doc) = transform(manifest, &routed_config());
    assert_eq!(label(&doc, "web", "com.example.team"), Some("blog"));
    // 値なしのラベルは空文字で残る
    assert_eq!(label(&doc, "web", "com.example.public"), Some(""));
    assert_eq!(label(&doc, "web", "traefik.enable"), Some("true"));
}

#[test]
fn test_environment_list_is_normalized_and_merged() {
    let manifest = r#"
services:
  app:
    image: example/app
    environment:
      - NODE_ENV=development
      - DATABASE_URL=postgres://db/app
      - BROKEN_ENTRY
  sidecar:
    image: example/sidecar
    environment:
      LOG_LEVEL: debug
"#;
    let mut config = StackConfig {
        name: "blog".to_string(),
        ..Default::default()
    };
    config
        .environment
        .insert("NODE_ENV".to_string(), "production".to_string());
    config
        .environment
        .insert("API_KEY".to_string(), "secret".to_string());

    let (_, doc) = transform(manifest, &config);
    let app_env = doc["services"]["app"]["environment"].as_mapping().unwrap();
    assert_eq!(app_env.get("NODE_ENV").and_then(Value::as_str), Some("production"));
    assert_eq!(
        app_env.get("DATABASE_URL").and_then(Value::as_str),
        Some("postgres://db/app")
    );
    assert_eq!(app_env.get("API_KEY").and_then(Value::as_str), Some("secret"));
    assert!(!app_env.contains_key("BROKEN_ENTRY"));

    let sidecar_env = doc["services"]["sidecar"]["environment"]
        .as_mapping()
        .unwrap();
    assert_eq!(sidecar_env.get("LOG_LEVEL").and_then(Value::as_str), Some("debug"));
    assert_eq!(sidecar_env.get("API_KEY").and_then(Value::as_str), Some("secret"));
}

#[test]
fn test_resource_limits_injected() {
    let manifest = r#"
services:
  app:
    image: example/app
    deploy:
      restart_policy:
        condition: on-failure
"#;
    let config = StackConfig {
        name: "blog".to_string(),
        cpu_limit: Some(1.5),
        memory_limit: Some("512m".to_string()),
        memory_reservation: Some("256m".to_string()),
        storage_limit: Some("10g".to_string()),
        ..Default::default()
    };

    let (_, doc) = transform(manifest, &config);
    let deploy = &doc["services"]["app"]["deploy"];
    assert_eq!(deploy["resources"]["limits"]["cpus"].as_f64(), Some(1.5));
    assert_eq!(deploy["resources"]["limits"]["memory"].as_str(), Some("512m"));
    assert_eq!(
        deploy["resources"]["reservations"]["memory"].as_str(),
        Some("256m")
    );
    assert_eq!(
        deploy["restart_policy"]["condition"].as_str(),
        Some("on-failure")
    );
    assert_eq!(label(&doc, "app", STORAGE_LIMIT_LABEL), Some("10g"));
}

#[test]
fn test_zero_cpu_limit_is_ignored() {
    let manifest = "services:\n  app:\n    image: example/app\n";
    let config = StackConfig {
        name: "blog".to_string(),
        cpu_limit: Some(0.0),
        ..Default::default()
    };
    let (_, doc) = transform(manifest, &config);
    assert!(doc["services"]["app"]["deploy"].is_null());
}

#[test]
fn test_unparsable_manifest_is_returned_unchanged() {
    let manifest = "services:\n  web:\n    image: {{ image }\n    ports: [\n";
    let dir = TempDir::new().unwrap();
    let output = ManifestTransformer::default()
        .transform(manifest, &routed_config(), dir.path())
        .unwrap();
    assert!(!output.structured);
    assert_eq!(output.manifest, manifest);
}

#[test]
fn test_compose_interpolation_survives_round_trip() {
    let manifest = r#"
services:
  web:
    image: "nginx:${NGINX_TAG:-alpine}"
    ports:
      - "${WEB_PORT}:80"
"#;
    let (_, doc) = transform(manifest, &routed_config());
    assert_eq!(
        doc["services"]["web"]["image"].as_str(),
        Some("nginx:${NGINX_TAG:-alpine}")
    );
    assert_eq!(service_port(&doc, "blog-web", "web").as_deref(), Some("80"));
}

#[test]
fn test_round_trip_preserves_services_and_networks() {
    let manifest = r#"
services:
  web:
    image: nginx
    ports: ["8080:80"]
  api:
    image: example/api
    expose: ["3000"]
  postgres:
    image: postgres:16
networks:
  backend: {}
volumes:
  pgdata: {}
"#;
    let original: Value = serde_yaml::from_str(manifest).unwrap();
    let mut config = routed_config();
    config
        .environment
        .insert("TZ".to_string(), "Asia/Tokyo".to_string());

    let (_, doc) = transform(manifest, &config);

    assert_eq!(
        doc["services"].as_mapping().unwrap().len(),
        original["services"].as_mapping().unwrap().len()
    );

    let mut before: Vec<_> = original["networks"]
        .as_mapping()
        .unwrap()
        .keys()
        .filter_map(Value::as_str)
        .collect();
    before.push("stackpilot-public");
    before.sort();
    let mut after: Vec<_> = doc["networks"]
        .as_mapping()
        .unwrap()
        .keys()
        .filter_map(Value::as_str)
        .collect();
    after.sort();
    assert_eq!(before, after);

    assert_eq!(doc["volumes"], original["volumes"]);
    assert_eq!(
        doc["services"]["postgres"]["environment"]["TZ"].as_str(),
        Some("Asia/Tokyo")
    );
}

#[test]
fn test_side_files_dotenv_and_gateway() {
    let manifest = r#"
services:
  kong:
    image: kong:2.8.1
    volumes:
      - ./volumes/api/kong.yml:/home/kong/temp.yml:ro
"#;
    let mut config = StackConfig {
        name: "supa".to_string(),
        ..Default::default()
    };
    config
        .environment
        .insert("ANON_KEY".to_string(), "anon".to_string());

    let (output, _) = transform(manifest, &config);
    let paths: Vec<_> = output
        .side_files
        .iter()
        .map(|f| f.relative_path.clone())
        .collect();
    assert_eq!(
        paths,
        vec![PathBuf::from("volumes/api/kong.yml"), PathBuf::from(".env")]
    );
    assert_eq!(output.side_files[1].contents, "ANON_KEY=anon\n");
}

#[test]
fn test_existing_gateway_config_is_not_overwritten() {
    let manifest = "services:\n  kong:\n    volumes:\n      - ./kong.yml:/home/kong/kong.yml\n";
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("kong.yml"), "custom: true\n").unwrap();

    let config = StackConfig {
        name: "supa".to_string(),
        ..Default::default()
    };
    let output = ManifestTransformer::default()
        .transform(manifest, &config, dir.path())
        .unwrap();
    assert!(output.side_files.is_empty());
}

#[test]
fn test_gateway_reference_outside_stack_dir_is_ignored() {
    assert_eq!(gateway_config_reference("- /etc/kong/kong.yml:/kong.yml"), None);
    assert_eq!(gateway_config_reference("- ../shared/kong.yml:/kong.yml"), None);
    assert_eq!(
        gateway_config_reference("- ./kong.yml:/home/kong/kong.yml"),
        Some(PathBuf::from("kong.yml"))
    );
}

#[test]
fn test_sanitize_and_router_name() {
    assert_eq!(sanitize_label("My.Blog_01"), "my-blog-01");
    assert_eq!(sanitize_label("--edge--"), "edge");
    assert_eq!(router_name("My.Blog", "web"), "my-blog-web");
    assert!(is_database_service("postgres-primary"));
    assert!(is_database_service("MongoDB"));
    assert!(!is_database_service("frontend"));
}
