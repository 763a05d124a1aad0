//! On-demand image transform path.
//!
//! The transform function sits behind its own invocation endpoint instead
//! of the render path. In signed mode that endpoint only accepts IAM-signed
//! requests, and an edge signer attached to the behavior signs every
//! viewer request on its way through the delivery layer.

use resource_layer::{LogicalId, ResourceKind, ResourceSpec};
use serde_json::json;

use crate::assets::ASSET_KEY_PREFIX;
use crate::config::ImageConfig;
use crate::domain::behavior::{CookieBehavior, QueryStringBehavior, MAX_TTL_SECS};
use crate::domain::{
    AllowedMethods, Behavior, CachePolicy, CachedMethods, CodePayload, DeployableUnit,
    EdgeEventType, EdgeFunctionAssociation, FunctionUrlAuth, Origin, Permission, Placement,
    Result, ViewerProtocolPolicy,
};
use crate::registry::{attribute_ref, edge_version_provider, ResourceScope};
use crate::routes::{ALL_VIEWER_EXCEPT_HOST_HEADER, IMAGE_PATTERN};

/// Bucket holding source images.
pub const BUCKET_NAME_ENV: &str = "BUCKET_NAME";
/// Key prefix of source images inside the bucket.
pub const BUCKET_KEY_PREFIX_ENV: &str = "BUCKET_KEY_PREFIX";

/// Cache policy name for transformed images.
pub const IMAGE_CACHE_POLICY: &str = "ImageCache";

const SIGNER_SOURCE: &str = r#"const { SignatureV4 } = require("@smithy/signature-v4");
const { Sha256 } = require("@aws-crypto/sha256-js");
exports.handler = async (event) => {
  const request = event.Records[0].cf.request;
  const host = request.origin.custom.domainName;
  const signer = new SignatureV4({
    service: "lambda",
    region: host.split(".")[2],
    credentials: {
      accessKeyId: process.env.AWS_ACCESS_KEY_ID,
      secretAccessKey: process.env.AWS_SECRET_ACCESS_KEY,
      sessionToken: process.env.AWS_SESSION_TOKEN,
    },
    sha256: Sha256,
  });
  const signed = await signer.sign({
    method: request.method,
    protocol: "https:",
    hostname: host,
    path: request.uri,
    query: Object.fromEntries(new URLSearchParams(request.querystring)),
    headers: { host },
  });
  for (const [key, value] of Object.entries(signed.headers)) {
    request.headers[key.toLowerCase()] = [{ key, value }];
  }
  return request;
};
"#;

/// Declared pieces of the image path.
#[derive(Debug, Clone)]
pub struct ImageTransformPath {
    /// Transform function; its bundle is patched in during finalization
    pub unit: DeployableUnit,
    /// Edge signer, present in signed mode
    pub signer: Option<DeployableUnit>,
    /// Ready for insertion at the image route
    pub behavior: Behavior,
}

/// Cache policy for transformed images: keyed on the query string (size,
/// quality, source) and `accept` (output format).
pub fn image_cache_policy() -> CachePolicy {
    CachePolicy {
        name: IMAGE_CACHE_POLICY.to_string(),
        default_ttl_secs: 86_400,
        min_ttl_secs: 0,
        max_ttl_secs: MAX_TTL_SECS,
        query_strings: QueryStringBehavior::All,
        cookies: CookieBehavior::None,
        headers: vec!["accept".to_string()],
        enable_brotli: true,
        enable_gzip: true,
    }
}

/// Declare the transform function, its endpoint and (in signed mode) the
/// edge signer, and return the behavior that routes to them.
pub fn build_image_behavior(
    scope: &mut ResourceScope,
    config: &ImageConfig,
    bucket: &str,
) -> Result<ImageTransformPath> {
    let function = scope.logical_id(&["ImageFunction"])?;
    let auth = if config.signed {
        FunctionUrlAuth::AwsIam
    } else {
        FunctionUrlAuth::None
    };

    let mut unit = DeployableUnit::new(function.clone(), "Next.js image optimization")
        .with_memory(config.memory_mb)
        .with_timeout(config.timeout_secs)
        .with_architecture(config.architecture);
    unit.add_environment(BUCKET_NAME_ENV, bucket)?;
    unit.add_environment(BUCKET_KEY_PREFIX_ENV, ASSET_KEY_PREFIX)?;
    unit.grant(Permission::new(
        &["s3:GetObject"],
        vec![format!("arn:aws:s3:::{bucket}/{ASSET_KEY_PREFIX}/*")],
    ))?;
    scope.declare(unit.to_resource_spec())?;

    let url = scope.logical_id(&["ImageFunction", "Url"])?;
    scope.declare(ResourceSpec::new(
        url,
        ResourceKind::FunctionUrl,
        json!({ "function": function, "auth": auth }),
    ))?;

    let mut behavior = Behavior {
        path_pattern: IMAGE_PATTERN.to_string(),
        origin: Origin::FunctionUrl {
            function: function.clone(),
            auth,
        },
        cache_policy: image_cache_policy(),
        origin_request_policy: Some(ALL_VIEWER_EXCEPT_HOST_HEADER.to_string()),
        response_headers_policy: None,
        viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
        allowed_methods: AllowedMethods::GetHeadOptions,
        cached_methods: CachedMethods::GetHead,
        compress: true,
        edge_functions: Vec::new(),
    };

    let signer = if config.signed {
        let signer = declare_signer(scope, &function)?;
        behavior.edge_functions.push(EdgeFunctionAssociation::new(
            EdgeEventType::ViewerRequest,
            signer.logical_id.clone(),
            false,
        ));
        Some(signer)
    } else {
        None
    };

    tracing::debug!(function = %function, signed = config.signed, "image path declared");
    Ok(ImageTransformPath {
        unit,
        signer,
        behavior,
    })
}

fn declare_signer(scope: &mut ResourceScope, function: &LogicalId) -> Result<DeployableUnit> {
    let id = scope.logical_id(&["ImageFunction", "Signer"])?;
    let mut signer = DeployableUnit::new(id.clone(), "Signs image transform requests")
        .with_placement(Placement::Edge)
        .with_memory(128)
        .with_timeout(5)
        .with_code(CodePayload::Inline {
            source: SIGNER_SOURCE.to_string(),
        });
    signer.grant(Permission::new(
        &["lambda:InvokeFunctionUrl"],
        vec![attribute_ref(function, "Arn")],
    ))?;
    scope.declare(signer.to_resource_spec())?;

    let grant = scope.logical_id(&["ImageFunction", "SignerGrant"])?;
    scope.declare(ResourceSpec::new(
        grant,
        ResourceKind::Grant,
        json!({
            "principal": id,
            "action": "lambda:InvokeFunctionUrl",
            "function": function,
        }),
    ))?;

    edge_version_provider(scope)?;
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ResourceScope {
        ResourceScope::new("site").unwrap()
    }

    #[test]
    fn test_public_endpoint_has_no_signer() {
        let mut scope = scope();
        let path = build_image_behavior(&mut scope, &ImageConfig::default(), "assets").unwrap();

        assert!(path.signer.is_none());
        assert!(path.behavior.edge_functions.is_empty());
        assert!(matches!(
            path.behavior.origin,
            Origin::FunctionUrl { auth: FunctionUrlAuth::None, .. }
        ));
        assert_eq!(path.unit.memory_mb, 1536);
        assert_eq!(path.unit.environment()[BUCKET_KEY_PREFIX_ENV], "_assets");
        assert_eq!(
            path.unit.permissions()[0].resources,
            vec!["arn:aws:s3:::assets/_assets/*".to_string()]
        );
        assert_eq!(scope.of_kind(ResourceKind::FunctionUrl).count(), 1);
    }

    #[test]
    fn test_signed_endpoint_attaches_viewer_request_signer() {
        let mut scope = scope();
        let config = ImageConfig {
            signed: true,
            ..ImageConfig::default()
        };
        let path = build_image_behavior(&mut scope, &config, "assets").unwrap();

        let signer = path.signer.expect("signer");
        assert_eq!(signer.placement, Placement::Edge);
        assert_eq!(
            signer.permissions()[0].actions,
            vec!["lambda:InvokeFunctionUrl".to_string()]
        );
        assert_eq!(path.behavior.edge_functions.len(), 1);
        let assoc = &path.behavior.edge_functions[0];
        assert_eq!(assoc.event_type, EdgeEventType::ViewerRequest);
        assert_eq!(assoc.function, signer.logical_id);
        assert!(matches!(
            path.behavior.origin,
            Origin::FunctionUrl { auth: FunctionUrlAuth::AwsIam, .. }
        ));
        assert_eq!(scope.of_kind(ResourceKind::Grant).count(), 1);
    }
}
