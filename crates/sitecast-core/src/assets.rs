//! Content classes and their cache contracts.

use serde::{Deserialize, Serialize};

use crate::routes::{DATA_PATTERN, IMAGE_PATTERN};

/// Bucket key prefix for static assets.
pub const ASSET_KEY_PREFIX: &str = "_assets";
/// Bucket key prefix for prerendered cache artifacts.
pub const CACHE_KEY_PREFIX: &str = "_cache";

/// Fingerprinted build assets: never change under the same key.
pub const IMMUTABLE: &str = "public,max-age=31536000,immutable";
/// Browsers revalidate; shared caches hold until invalidated.
pub const SHARED_REVALIDATE: &str = "public,max-age=0,s-maxage=31536000,must-revalidate";
/// Never served from a cache.
pub const NO_STORE: &str = "no-store";

const VERSIONED_STATIC_PREFIX: &str = "_next/static/";

/// Which build directory an artifact came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    Assets,
    Cache,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    /// Content-hashed build output under `_next/static/`
    VersionedStatic,
    /// Anything else in the public assets directory
    PublicFile,
    /// HTML rendered at build time
    PrerenderedPage,
    /// Data the server reads back to revalidate prerendered pages
    PrerenderCache,
    /// Rendered per request
    ServerRendered,
    /// Navigation data fetches
    DataRoute,
    /// On-demand transformed images
    OptimizedImage,
}

impl ContentClass {
    pub const ALL: [ContentClass; 7] = [
        ContentClass::VersionedStatic,
        ContentClass::PublicFile,
        ContentClass::PrerenderedPage,
        ContentClass::PrerenderCache,
        ContentClass::ServerRendered,
        ContentClass::DataRoute,
        ContentClass::OptimizedImage,
    ];

    /// Cache-control stamped on stored objects; `None` when the origin
    /// sets it per response.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            ContentClass::VersionedStatic => Some(IMMUTABLE),
            ContentClass::PublicFile | ContentClass::PrerenderedPage => Some(SHARED_REVALIDATE),
            ContentClass::PrerenderCache => Some(NO_STORE),
            ContentClass::ServerRendered
            | ContentClass::DataRoute
            | ContentClass::OptimizedImage => None,
        }
    }

    pub fn is_origin_controlled(&self) -> bool {
        self.cache_control().is_none()
    }
}

/// Class of an artifact at `relative_path` inside `source`.
pub fn classify_asset(source: ArtifactSource, relative_path: &str) -> ContentClass {
    let path = relative_path.trim_start_matches('/');
    match source {
        ArtifactSource::Assets if path.starts_with(VERSIONED_STATIC_PREFIX) => {
            ContentClass::VersionedStatic
        }
        ArtifactSource::Assets => ContentClass::PublicFile,
        ArtifactSource::Cache if path.ends_with(".html") => ContentClass::PrerenderedPage,
        ArtifactSource::Cache => ContentClass::PrerenderCache,
    }
}

/// Class of the requests a route pattern serves.
pub fn route_class(pattern: &str) -> ContentClass {
    match pattern {
        DATA_PATTERN => ContentClass::DataRoute,
        IMAGE_PATTERN => ContentClass::OptimizedImage,
        _ => ContentClass::ServerRendered,
    }
}

/// How one class of build artifact is uploaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetRule {
    pub class: ContentClass,
    pub source: ArtifactSource,
    /// Glob over paths relative to the source directory
    pub pattern: String,
    pub key_prefix: String,
    pub cache_control: String,
}

/// Upload rules for every stored content class, most specific first.
pub fn asset_rules() -> Vec<AssetRule> {
    let rule = |class: ContentClass, source: ArtifactSource, pattern: &str| AssetRule {
        class,
        source,
        pattern: pattern.to_string(),
        key_prefix: match source {
            ArtifactSource::Assets => ASSET_KEY_PREFIX,
            ArtifactSource::Cache => CACHE_KEY_PREFIX,
        }
        .to_string(),
        cache_control: class.cache_control().unwrap_or(NO_STORE).to_string(),
    };

    vec![
        rule(
            ContentClass::VersionedStatic,
            ArtifactSource::Assets,
            "_next/static/*",
        ),
        rule(ContentClass::PublicFile, ArtifactSource::Assets, "*"),
        rule(ContentClass::PrerenderedPage, ArtifactSource::Cache, "*.html"),
        rule(ContentClass::PrerenderCache, ArtifactSource::Cache, "*"),
    ]
}
