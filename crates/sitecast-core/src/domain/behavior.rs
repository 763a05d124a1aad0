//! Delivery-layer behaviors: one path class, one origin, one cache contract.

use resource_layer::LogicalId;
use serde::{Deserialize, Serialize};

/// Request headers forwarded into the server cache key.
///
/// Each of these distinguishes a client-side navigation state; dropping one
/// lets responses for different states share a cache entry.
pub const SERVER_CACHE_KEY_HEADERS: [&str; 5] = [
    "accept",
    "rsc",
    "next-router-prefetch",
    "next-router-state-tree",
    "next-url",
];

/// One year, the ceiling for shared-cache TTLs.
pub const MAX_TTL_SECS: u64 = 31_536_000;

/// How a direct invocation endpoint authenticates callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FunctionUrlAuth {
    /// Reachable from the public internet
    None,
    /// Only requests signed by an authorized principal
    AwsIam,
}

/// Where a behavior sends cache misses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Origin {
    /// A function's direct invocation endpoint
    FunctionUrl {
        function: LogicalId,
        auth: FunctionUrlAuth,
    },
    /// An object storage bucket under a key prefix
    Bucket { bucket: String, key_prefix: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewerProtocolPolicy {
    AllowAll,
    RedirectToHttps,
    HttpsOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllowedMethods {
    GetHead,
    GetHeadOptions,
    All,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CachedMethods {
    GetHead,
    GetHeadOptions,
}

/// Delivery-layer event an edge function fires on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeEventType {
    ViewerRequest,
    OriginRequest,
    OriginResponse,
    ViewerResponse,
}

/// An edge-replicated function attached to a behavior.
///
/// `version` is empty until finalization publishes the function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeFunctionAssociation {
    pub event_type: EdgeEventType,
    pub function: LogicalId,
    pub include_body: bool,
    pub version: Option<LogicalId>,
}

impl EdgeFunctionAssociation {
    pub fn new(event_type: EdgeEventType, function: LogicalId, include_body: bool) -> Self {
        Self {
            event_type,
            function,
            include_body,
            version: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryStringBehavior {
    None,
    All,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CookieBehavior {
    None,
    All,
}

/// Cache key and TTL contract of a behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachePolicy {
    pub name: String,
    pub default_ttl_secs: u64,
    pub min_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub query_strings: QueryStringBehavior,
    pub cookies: CookieBehavior,
    /// Request headers folded into the cache key
    pub headers: Vec<String>,
    pub enable_brotli: bool,
    pub enable_gzip: bool,
}

impl CachePolicy {
    /// Policy for server-rendered responses: the origin decides freshness
    /// through its own cache-control, bounded to one year.
    pub fn server(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_ttl_secs: 0,
            min_ttl_secs: 0,
            max_ttl_secs: MAX_TTL_SECS,
            query_strings: QueryStringBehavior::All,
            cookies: CookieBehavior::None,
            headers: SERVER_CACHE_KEY_HEADERS.iter().map(|h| h.to_string()).collect(),
            enable_brotli: true,
            enable_gzip: true,
        }
    }
}

/// A routing rule: path pattern to origin plus cache contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Behavior {
    pub path_pattern: String,
    pub origin: Origin,
    pub cache_policy: CachePolicy,
    #[serde(default)]
    pub origin_request_policy: Option<String>,
    #[serde(default)]
    pub response_headers_policy: Option<String>,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: CachedMethods,
    #[serde(default = "default_compress")]
    pub compress: bool,
    /// Ordered pre/post-processing edge functions
    #[serde(default)]
    pub edge_functions: Vec<EdgeFunctionAssociation>,
}

fn default_compress() -> bool {
    true
}

impl Behavior {
    /// Same behavior served under another path pattern.
    pub fn at(&self, path_pattern: impl Into<String>) -> Self {
        Self {
            path_pattern: path_pattern.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_policy_forwards_exact_header_list() {
        let policy = CachePolicy::server("ServerCache");
        assert_eq!(
            policy.headers,
            vec![
                "accept",
                "rsc",
                "next-router-prefetch",
                "next-router-state-tree",
                "next-url"
            ]
        );
        assert_eq!(policy.default_ttl_secs, 0);
        assert_eq!(policy.max_ttl_secs, MAX_TTL_SECS);
        assert_eq!(policy.cookies, CookieBehavior::None);
    }

    #[test]
    fn test_behavior_deserializes_with_defaults() {
        let behavior: Behavior = serde_json::from_value(serde_json::json!({
            "path_pattern": "docs/*",
            "origin": {"type": "bucket", "bucket": "docs", "key_prefix": ""},
            "cache_policy": CachePolicy::server("Docs"),
            "viewer_protocol_policy": "redirect_to_https",
            "allowed_methods": "get_head",
            "cached_methods": "get_head"
        }))
        .unwrap();
        assert!(behavior.compress);
        assert!(behavior.edge_functions.is_empty());
        assert_eq!(behavior.at("blog/*").path_pattern, "blog/*");
    }
}
