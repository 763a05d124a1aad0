//! Route table assembly for the two render topologies.

use resource_layer::LogicalId;
use serde::{Deserialize, Serialize};

use crate::assets::ASSET_KEY_PREFIX;
use crate::domain::{
    AllowedMethods, Behavior, CachePolicy, CachedMethods, EdgeEventType, EdgeFunctionAssociation,
    FunctionUrlAuth, Origin, Result, RouteTable, SynthError, TopologyKind, ViewerProtocolPolicy,
};

/// API routes, rendered by the server.
pub const API_PATTERN: &str = "api/*";
/// Client-side navigation data fetches, rendered by the server.
pub const DATA_PATTERN: &str = "_next/data/*";
/// On-demand image transforms.
pub const IMAGE_PATTERN: &str = "_next/image*";

/// Cache policy shared by every server-rendered behavior.
pub const SERVER_CACHE_POLICY: &str = "ServerCache";

/// Managed origin request policy forwarding everything but `Host`.
pub const ALL_VIEWER_EXCEPT_HOST_HEADER: &str = "AllViewerExceptHostHeader";

/// Where the render compute runs, with what it needs to build its behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerTopology {
    /// Invoked through its regional endpoint
    Regional { server: LogicalId },
    /// Attached to the delivery layer as an origin-request handler in
    /// front of the asset bucket
    EdgeReplicated { server: LogicalId, bucket: String },
}

impl ServerTopology {
    pub fn kind(&self) -> TopologyKind {
        match self {
            ServerTopology::Regional { .. } => TopologyKind::Regional,
            ServerTopology::EdgeReplicated { .. } => TopologyKind::EdgeReplicated,
        }
    }

    pub fn server(&self) -> &LogicalId {
        match self {
            ServerTopology::Regional { server } | ServerTopology::EdgeReplicated { server, .. } => {
                server
            }
        }
    }

    /// Edge request handlers cannot proxy to the separate transform
    /// endpoint without extra origin wiring, so only regional sites get an
    /// image route.
    pub fn supports_image_route(&self) -> bool {
        matches!(self, ServerTopology::Regional { .. })
    }

    /// The behavior every server-rendered path class shares.
    pub fn build_server_behavior(&self) -> Behavior {
        let (origin, origin_request_policy, edge_functions) = match self {
            ServerTopology::Regional { server } => (
                Origin::FunctionUrl {
                    function: server.clone(),
                    auth: FunctionUrlAuth::None,
                },
                Some(ALL_VIEWER_EXCEPT_HOST_HEADER.to_string()),
                Vec::new(),
            ),
            ServerTopology::EdgeReplicated { server, bucket } => (
                Origin::Bucket {
                    bucket: bucket.clone(),
                    key_prefix: ASSET_KEY_PREFIX.to_string(),
                },
                None,
                vec![EdgeFunctionAssociation::new(
                    EdgeEventType::OriginRequest,
                    server.clone(),
                    true,
                )],
            ),
        };

        Behavior {
            path_pattern: crate::domain::route_table::DEFAULT_PATTERN.to_string(),
            origin,
            cache_policy: CachePolicy::server(SERVER_CACHE_POLICY),
            origin_request_policy,
            response_headers_policy: None,
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            allowed_methods: AllowedMethods::All,
            cached_methods: CachedMethods::GetHeadOptions,
            compress: true,
            edge_functions,
        }
    }
}

/// Overridable fields of the default behavior. Its origin and handlers
/// always come from the topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultBehaviorOverride {
    pub cache_policy: Option<CachePolicy>,
    pub origin_request_policy: Option<String>,
    pub response_headers_policy: Option<String>,
}

impl DefaultBehaviorOverride {
    fn apply(&self, behavior: &mut Behavior) {
        if let Some(policy) = &self.cache_policy {
            behavior.cache_policy = policy.clone();
        }
        if let Some(policy) = &self.origin_request_policy {
            behavior.origin_request_policy = Some(policy.clone());
        }
        if let Some(policy) = &self.response_headers_policy {
            behavior.response_headers_policy = Some(policy.clone());
        }
    }
}

/// Caller-supplied route changes, merged after the fixed behaviors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteOverrides {
    pub default: DefaultBehaviorOverride,
    /// Full behaviors; one whose pattern matches a fixed entry replaces it
    pub behaviors: Vec<Behavior>,
}

impl RouteOverrides {
    pub fn is_empty(&self) -> bool {
        self.default == DefaultBehaviorOverride::default() && self.behaviors.is_empty()
    }

    fn apply(&self, table: &mut RouteTable) -> Result<()> {
        self.default.apply(table.default_behavior_mut());
        for behavior in &self.behaviors {
            table.insert(behavior.clone())?;
        }
        Ok(())
    }
}

/// Assemble the route table for `topology`.
///
/// `image` is the transform behavior; it is required for topologies that
/// route images and left out for the others.
pub fn build_route_table(
    topology: &ServerTopology,
    image: Option<&Behavior>,
    overrides: &RouteOverrides,
) -> Result<RouteTable> {
    let server = topology.build_server_behavior();
    let mut table = RouteTable::new(server.clone());
    table.insert(server.at(API_PATTERN))?;
    table.insert(server.at(DATA_PATTERN))?;

    if topology.supports_image_route() {
        let image = image.ok_or_else(|| {
            SynthError::Config(format!("{} topology needs an image behavior", topology.kind()))
        })?;
        table.insert(image.at(IMAGE_PATTERN))?;
    } else if image.is_some() {
        tracing::debug!(topology = %topology.kind(), "image behavior not routed");
    }

    overrides.apply(&mut table)?;
    tracing::debug!(
        topology = %topology.kind(),
        behaviors = table.len(),
        "route table built"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::behavior::SERVER_CACHE_KEY_HEADERS;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn regional() -> ServerTopology {
        ServerTopology::Regional {
            server: id("SiteServer"),
        }
    }

    fn edge() -> ServerTopology {
        ServerTopology::EdgeReplicated {
            server: id("SiteServer"),
            bucket: "assets".to_string(),
        }
    }

    fn image() -> Behavior {
        let mut behavior = regional().build_server_behavior();
        behavior.origin = Origin::FunctionUrl {
            function: id("SiteImage"),
            auth: FunctionUrlAuth::None,
        };
        behavior
    }

    #[test]
    fn test_regional_has_four_behaviors() {
        let table =
            build_route_table(&regional(), Some(&image()), &RouteOverrides::default()).unwrap();
        assert_eq!(table.len(), 4);
        let patterns: Vec<_> = table
            .behaviors()
            .iter()
            .map(|b| b.path_pattern.as_str())
            .collect();
        assert_eq!(patterns, vec![API_PATTERN, DATA_PATTERN, IMAGE_PATTERN]);
    }

    #[test]
    fn test_regional_without_image_fails() {
        assert!(matches!(
            build_route_table(&regional(), None, &RouteOverrides::default()),
            Err(SynthError::Config(_))
        ));
    }

    #[test]
    fn test_edge_omits_image_route() {
        let table =
            build_route_table(&edge(), Some(&image()), &RouteOverrides::default()).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.get(IMAGE_PATTERN).is_none());

        let default = table.default_behavior();
        assert!(matches!(default.origin, Origin::Bucket { .. }));
        assert_eq!(default.edge_functions.len(), 1);
        assert_eq!(default.edge_functions[0].event_type, EdgeEventType::OriginRequest);
        assert!(default.edge_functions[0].include_body);
    }

    #[test]
    fn test_server_behaviors_share_cache_key_headers() {
        let table =
            build_route_table(&regional(), Some(&image()), &RouteOverrides::default()).unwrap();
        for pattern in ["*", API_PATTERN, DATA_PATTERN] {
            assert_eq!(
                table.get(pattern).unwrap().cache_policy.headers,
                SERVER_CACHE_KEY_HEADERS.to_vec()
            );
        }
    }

    #[test]
    fn test_default_override_keeps_origin() {
        let overrides = RouteOverrides {
            default: DefaultBehaviorOverride {
                response_headers_policy: Some("Security".to_string()),
                ..Default::default()
            },
            behaviors: Vec::new(),
        };
        let table = build_route_table(&regional(), Some(&image()), &overrides).unwrap();
        let default = table.default_behavior();
        assert_eq!(default.response_headers_policy.as_deref(), Some("Security"));
        assert_eq!(default.origin, regional().build_server_behavior().origin);
    }

    #[test]
    fn test_override_cannot_replace_default() {
        let overrides = RouteOverrides {
            default: DefaultBehaviorOverride::default(),
            behaviors: vec![image().at("*")],
        };
        assert!(build_route_table(&regional(), Some(&image()), &overrides).is_err());
    }
}
