//! Route table assembly across topologies and overrides.

use sitecast_core::routes::{API_PATTERN, DATA_PATTERN, IMAGE_PATTERN, SERVER_CACHE_POLICY};
use sitecast_core::{
    build_image_behavior, build_route_table, Behavior, ImageConfig, LogicalId, Origin,
    ResourceScope, RouteOverrides, ServerTopology, SynthError,
};

fn scope() -> ResourceScope {
    ResourceScope::new("docs").expect("scope")
}

fn regional(scope: &ResourceScope) -> ServerTopology {
    ServerTopology::Regional {
        server: scope.logical_id(&["ServerFunction"]).expect("id"),
    }
}

fn edge(scope: &ResourceScope) -> ServerTopology {
    ServerTopology::EdgeReplicated {
        server: scope.logical_id(&["ServerFunction"]).expect("id"),
        bucket: "docs-assets".to_string(),
    }
}

fn image_behavior(scope: &mut ResourceScope) -> Behavior {
    build_image_behavior(scope, &ImageConfig::default(), "docs-assets")
        .expect("image path")
        .behavior
}

fn server_id(behavior: &Behavior) -> Option<&LogicalId> {
    match &behavior.origin {
        Origin::FunctionUrl { function, .. } => Some(function),
        Origin::Bucket { .. } => None,
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

#[test]
fn regional_routes_server_paths_to_one_origin() {
    let mut scope = scope();
    let topology = regional(&scope);
    let image = image_behavior(&mut scope);

    let table = build_route_table(&topology, Some(&image), &RouteOverrides::default())
        .expect("table");

    let patterns: Vec<_> = table
        .behaviors()
        .iter()
        .map(|b| b.path_pattern.as_str())
        .collect();
    assert_eq!(patterns, vec![API_PATTERN, DATA_PATTERN, IMAGE_PATTERN]);

    let default = table.default_behavior();
    for pattern in [API_PATTERN, DATA_PATTERN] {
        let behavior = table.get(pattern).expect("server behavior");
        assert_eq!(behavior.origin, default.origin);
        assert_eq!(behavior.cache_policy, default.cache_policy);
    }
    assert_eq!(default.cache_policy.name, SERVER_CACHE_POLICY);
    assert_ne!(server_id(table.get(IMAGE_PATTERN).expect("image")), server_id(default));
    assert_eq!(table.edge_functions().count(), 0);
}

#[test]
fn edge_replicated_attaches_server_at_origin_request() {
    let scope = scope();
    let topology = edge(&scope);

    let table = build_route_table(&topology, None, &RouteOverrides::default()).expect("table");

    assert_eq!(table.len(), 3);
    assert!(table.get(IMAGE_PATTERN).is_none());
    assert!(matches!(
        table.default_behavior().origin,
        Origin::Bucket { .. }
    ));

    // Default, api/* and _next/data/* all run the server at the edge.
    let handlers: Vec<_> = table.edge_functions().collect();
    assert_eq!(handlers.len(), 3);
    assert!(handlers
        .iter()
        .all(|a| &a.function == topology.server() && a.include_body && a.version.is_none()));
}

#[test]
fn regional_without_image_is_rejected() {
    let scope = scope();
    assert!(matches!(
        build_route_table(&regional(&scope), None, &RouteOverrides::default()),
        Err(SynthError::Config(_))
    ));
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

#[test]
fn api_override_leaves_data_route_on_server() {
    let mut scope = scope();
    let topology = regional(&scope);
    let image = image_behavior(&mut scope);

    let mut api = topology.build_server_behavior().at(API_PATTERN);
    api.cache_policy.name = "ApiNoCache".to_string();
    api.cache_policy.max_ttl_secs = 0;
    let overrides = RouteOverrides {
        behaviors: vec![api],
        ..RouteOverrides::default()
    };

    let table = build_route_table(&topology, Some(&image), &overrides).expect("table");

    assert_eq!(table.len(), 4);
    assert_eq!(table.behaviors()[0].path_pattern, API_PATTERN);
    assert_eq!(table.get(API_PATTERN).expect("api").cache_policy.name, "ApiNoCache");
    let data = table.get(DATA_PATTERN).expect("data");
    assert_eq!(data.cache_policy.name, SERVER_CACHE_POLICY);
    assert_eq!(server_id(data), server_id(table.default_behavior()));
}

#[test]
fn slash_prefixed_override_replaces_fixed_route() {
    let mut scope = scope();
    let topology = regional(&scope);
    let image = image_behavior(&mut scope);

    let mut api = topology.build_server_behavior().at("/api/*");
    api.cache_policy.name = "ApiNoCache".to_string();
    let overrides = RouteOverrides {
        behaviors: vec![api],
        ..RouteOverrides::default()
    };

    let table = build_route_table(&topology, Some(&image), &overrides).expect("table");

    assert_eq!(table.len(), 4);
    assert_eq!(table.behaviors()[0].path_pattern, "/api/*");
    assert_eq!(table.resolve("/api/x").cache_policy.name, "ApiNoCache");
    assert_eq!(table.get(API_PATTERN).expect("api").cache_policy.name, "ApiNoCache");
    assert_eq!(
        table.get(DATA_PATTERN).expect("data").cache_policy.name,
        SERVER_CACHE_POLICY
    );
}

#[test]
fn extra_override_is_appended_and_resolves() {
    let scope = scope();
    let topology = edge(&scope);
    let mut docs = topology.build_server_behavior().at("/docs/*");
    docs.response_headers_policy = Some("SecurityHeaders".to_string());
    let overrides = RouteOverrides {
        behaviors: vec![docs],
        ..RouteOverrides::default()
    };

    let table = build_route_table(&topology, None, &overrides).expect("table");

    assert_eq!(table.behaviors().last().expect("last").path_pattern, "/docs/*");
    assert_eq!(table.resolve("/docs/intro").path_pattern, "/docs/*");
    assert_eq!(table.resolve("/api/users").path_pattern, API_PATTERN);
    assert_eq!(table.resolve("/_next/data/b1/index.json").path_pattern, DATA_PATTERN);
    assert_eq!(table.resolve("/pricing").path_pattern, "*");
}

#[test]
fn override_cannot_claim_catch_all() {
    let scope = scope();
    let topology = edge(&scope);
    let overrides = RouteOverrides {
        behaviors: vec![topology.build_server_behavior().at("/*")],
        ..RouteOverrides::default()
    };

    assert!(matches!(
        build_route_table(&topology, None, &overrides),
        Err(SynthError::InvalidPathPattern { .. })
    ));
}

#[test]
fn default_override_from_toml_keeps_origin() {
    let mut scope = scope();
    let topology = regional(&scope);
    let image = image_behavior(&mut scope);

    let overrides: RouteOverrides = toml::from_str(
        r#"
        [default]
        response_headers_policy = "SecurityHeaders"
        "#,
    )
    .expect("overrides");
    let table = build_route_table(&topology, Some(&image), &overrides).expect("table");

    let default = table.default_behavior();
    assert_eq!(default.response_headers_policy.as_deref(), Some("SecurityHeaders"));
    assert_eq!(server_id(default), Some(topology.server()));
}
