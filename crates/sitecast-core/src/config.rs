//! Site configuration loaded from TOML.
//!
//! Every section except the site name and bucket has defaults, so the
//! smallest valid file is:
//!
//! ```toml
//! name = "docs"
//! bucket = "docs-assets"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Architecture, PathPattern, Result, SynthError, TopologyKind};
use crate::routes::RouteOverrides;

/// Region used when neither the file nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Environment variable overriding [`SiteConfig::region`].
pub const REGION_ENV: &str = "SITECAST_REGION";

/// Environment variable overriding [`SiteConfig::bucket`].
pub const BUCKET_ENV: &str = "SITECAST_BUCKET";

/// Smallest and largest function memory the provisioner accepts.
pub const MEMORY_RANGE_MB: std::ops::RangeInclusive<u32> = 128..=10240;

/// Longest timeout an edge-replicated request handler may have.
pub const MAX_EDGE_TIMEOUT_SECS: u32 = 30;

/// Largest batch one consumer invocation may receive.
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest receive wait the queue supports.
pub const MAX_RECEIVE_WAIT_SECS: u32 = 20;

/// Top-level site configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Site name; root of every logical id
    pub name: String,
    /// Asset and cache bucket
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Site root holding the build output, relative to the config file
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub topology: TopologyKind,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub revalidation: RevalidationConfig,
    #[serde(default)]
    pub routes: RouteOverrides,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_path() -> PathBuf {
    PathBuf::from(".")
}

/// Render compute settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub memory_mb: u32,
    pub timeout_secs: u32,
    pub architecture: Architecture,
    /// Extra environment passed to the render compute
    pub environment: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            memory_mb: 1024,
            timeout_secs: 10,
            architecture: Architecture::X86_64,
            environment: BTreeMap::new(),
        }
    }
}

/// Image transform settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    pub memory_mb: u32,
    pub timeout_secs: u32,
    pub architecture: Architecture,
    /// Restrict the transform endpoint to requests signed at the edge
    pub signed: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            memory_mb: 1536,
            timeout_secs: 25,
            architecture: Architecture::Arm64,
            signed: false,
        }
    }
}

/// Background regeneration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RevalidationConfig {
    pub enabled: bool,
    /// Messages per consumer invocation
    pub batch_size: u32,
    /// Long-poll window
    pub receive_wait_secs: u32,
    pub visibility_timeout_secs: u32,
    pub memory_mb: u32,
    pub timeout_secs: u32,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 5,
            receive_wait_secs: 20,
            visibility_timeout_secs: 30,
            memory_mb: 128,
            timeout_secs: 30,
        }
    }
}

impl SiteConfig {
    /// Config with every optional section at its default.
    pub fn new(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
            region: default_region(),
            path: default_path(),
            topology: TopologyKind::default(),
            server: ServerConfig::default(),
            image: ImageConfig::default(),
            revalidation: RevalidationConfig::default(),
            routes: RouteOverrides::default(),
        }
    }

    /// Read and parse a TOML file. Does not validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `SITECAST_REGION` / `SITECAST_BUCKET` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(region) = lookup(REGION_ENV).filter(|v| !v.is_empty()) {
            tracing::debug!(%region, "region overridden from environment");
            self.region = region;
        }
        if let Some(bucket) = lookup(BUCKET_ENV).filter(|v| !v.is_empty()) {
            tracing::debug!(%bucket, "bucket overridden from environment");
            self.bucket = bucket;
        }
    }

    /// Site root resolved against the directory holding the config file.
    pub fn site_root(&self, config_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            config_dir.join(&self.path)
        }
    }

    /// Check every constraint synthesis relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SynthError::Config("site name must not be empty".into()));
        }
        if self.bucket.trim().is_empty() {
            return Err(SynthError::Config("bucket must not be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(SynthError::Config("region must not be empty".into()));
        }

        check_memory("server", self.server.memory_mb)?;
        check_memory("image", self.image.memory_mb)?;
        check_memory("revalidation consumer", self.revalidation.memory_mb)?;

        if self.topology == TopologyKind::EdgeReplicated
            && self.server.timeout_secs > MAX_EDGE_TIMEOUT_SECS
        {
            return Err(SynthError::Config(format!(
                "edge-replicated server timeout must be <= {MAX_EDGE_TIMEOUT_SECS}s, got {}s",
                self.server.timeout_secs
            )));
        }

        let r = &self.revalidation;
        if r.batch_size == 0 || r.batch_size > MAX_BATCH_SIZE {
            return Err(SynthError::Config(format!(
                "revalidation batch size must be 1..={MAX_BATCH_SIZE}, got {}",
                r.batch_size
            )));
        }
        if r.receive_wait_secs > MAX_RECEIVE_WAIT_SECS {
            return Err(SynthError::Config(format!(
                "revalidation receive wait must be 0..={MAX_RECEIVE_WAIT_SECS}s, got {}s",
                r.receive_wait_secs
            )));
        }
        if r.enabled && r.visibility_timeout_secs < r.timeout_secs {
            return Err(SynthError::Config(format!(
                "revalidation visibility timeout ({}s) is shorter than the consumer timeout ({}s)",
                r.visibility_timeout_secs, r.timeout_secs
            )));
        }

        for behavior in &self.routes.behaviors {
            PathPattern::parse(&behavior.path_pattern)?;
        }
        Ok(())
    }
}

fn check_memory(what: &str, memory_mb: u32) -> Result<()> {
    if !MEMORY_RANGE_MB.contains(&memory_mb) {
        return Err(SynthError::Config(format!(
            "{what} memory must be {}..={} MB, got {memory_mb}",
            MEMORY_RANGE_MB.start(),
            MEMORY_RANGE_MB.end()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config =
            SiteConfig::from_toml_str("name = \"docs\"\nbucket = \"docs-assets\"\n").unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.topology, TopologyKind::Regional);
        assert_eq!(config.server.memory_mb, 1024);
        assert_eq!(config.image.memory_mb, 1536);
        assert_eq!(config.image.architecture, Architecture::Arm64);
        assert_eq!(config.revalidation.batch_size, 5);
        assert_eq!(config.revalidation.receive_wait_secs, 20);
        config.validate().unwrap();
    }

    #[test]
    fn test_full_file_parses() {
        let text = r#"
name = "shop"
bucket = "shop-assets"
region = "eu-west-1"
topology = "edge_replicated"

[server]
memory_mb = 512
timeout_secs = 20
environment = { API_URL = "https://api.example.com" }

[image]
signed = true

[revalidation]
batch_size = 10

[routes.default]
response_headers_policy = "SecurityHeaders"
"#;
        let config = SiteConfig::from_toml_str(text).unwrap();
        assert_eq!(config.topology, TopologyKind::EdgeReplicated);
        assert_eq!(config.server.environment["API_URL"], "https://api.example.com");
        assert!(config.image.signed);
        assert_eq!(
            config.routes.default.response_headers_policy.as_deref(),
            Some("SecurityHeaders")
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(SiteConfig::from_toml_str("name = \"a\"\nbucket = \"b\"\nbogus = 1\n").is_err());
    }

    #[test]
    fn test_default_override_cannot_touch_origin() {
        let text = "name = \"a\"\nbucket = \"b\"\n[routes.default]\norigin = \"x\"\n";
        assert!(SiteConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SiteConfig::new("site", "bucket");
        config.server.memory_mb = 64;
        assert!(matches!(config.validate(), Err(SynthError::Config(_))));

        let mut config = SiteConfig::new("site", "bucket");
        config.topology = TopologyKind::EdgeReplicated;
        config.server.timeout_secs = 31;
        assert!(config.validate().is_err());

        let mut config = SiteConfig::new("site", "bucket");
        config.revalidation.batch_size = 11;
        assert!(config.validate().is_err());

        let mut config = SiteConfig::new("site", "bucket");
        config.revalidation.receive_wait_secs = 21;
        assert!(config.validate().is_err());

        let config = SiteConfig::new(" ", "bucket");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SiteConfig::new("site", "bucket");
        config.apply_overrides_from(|key| match key {
            REGION_ENV => Some("ap-southeast-2".to_string()),
            BUCKET_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.region, "ap-southeast-2");
        assert_eq!(config.bucket, "bucket");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        std::fs::write(&path, "name = \"a\"\nbucket = \"b\"\npath = \"web\"\n").unwrap();

        let config = SiteConfig::load(&path).unwrap();
        assert_eq!(config.site_root(dir.path()), dir.path().join("web"));
    }
}
