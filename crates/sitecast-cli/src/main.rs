//! Sitecast CLI
//!
//! The `sitecast` command compiles a built site into a deployment
//! descriptor.
//!
//! ## Commands
//!
//! - `synth`: run both synthesis phases against local state
//! - `routes`: declare only, and print the route table
//! - `hash`: print the digest of a packaged bundle

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bundle_digest::{bundle_size, hash_bundle, BuildOutput};
use clap::{Parser, Subcommand};
use resource_layer::StateSnapshot;
use sitecast_core::{
    provision, synthesize, Origin, RouteTable, SiteConfig, SiteDescriptor, SiteSynthesizer,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "sitecast")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deployment descriptor compiler for hybrid SSR sites", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the site descriptor and provision it into local state
    Synth {
        /// Site configuration file
        #[arg(short, long, default_value = "site.toml")]
        config: PathBuf,

        /// Write the descriptor here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Local provider state (resource records and version ledger)
        #[arg(long, default_value = ".sitecast/state.json")]
        state: PathBuf,
    },

    /// Print the route table without reading the build
    Routes {
        /// Site configuration file
        #[arg(short, long, default_value = "site.toml")]
        config: PathBuf,
    },

    /// Print the digest of a bundle file or directory
    Hash {
        /// Bundle path
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sitecast_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Synth { config, out, state } => {
            let descriptor = cmd_synth(&config, &state).await?;
            write_descriptor(&descriptor, out.as_deref())
        }
        Commands::Routes { config } => cmd_routes(&config),
        Commands::Hash { path } => cmd_hash(&path),
    }
}

/// Load a config file, apply environment overrides and resolve the site
/// root relative to the file.
fn load_config(path: &Path) -> Result<(SiteConfig, PathBuf)> {
    let mut config = SiteConfig::load(path)
        .with_context(|| format!("Failed to load site config {:?}", path))?;
    config.apply_env_overrides();

    let config_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let root = config.site_root(config_dir);
    Ok((config, root))
}

/// Run both phases, provision the result and persist the updated state.
async fn cmd_synth(config_path: &Path, state_path: &Path) -> Result<SiteDescriptor> {
    let (config, root) = load_config(config_path)?;
    let snapshot = StateSnapshot::load(state_path)
        .with_context(|| format!("Failed to read state {:?}", state_path))?;
    let (provider, ledger) = snapshot.into_parts();

    let output = BuildOutput::locate(&root);
    let descriptor = synthesize(&output, config, &provider, &ledger)
        .await
        .with_context(|| format!("Failed to synthesize site at {:?}", root))?;

    let report = provision(&descriptor, &provider)
        .await
        .context("Failed to provision descriptor")?;

    StateSnapshot::capture(&provider, &ledger)
        .save(state_path)
        .with_context(|| format!("Failed to write state {:?}", state_path))?;

    info!(
        site = %descriptor.site(),
        build_id = %descriptor.build_id(),
        topology = %descriptor.topology(),
        versions = descriptor.versions().len(),
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        "synthesis complete"
    );
    Ok(descriptor)
}

fn write_descriptor(descriptor: &SiteDescriptor, out: Option<&Path>) -> Result<()> {
    let json = descriptor.to_json_pretty()?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write descriptor {:?}", path))?;
            println!("Descriptor written to {:?}", path);
            for version in descriptor.versions() {
                println!("Version: {} ({})", version.identifier, version.content_hash.short());
            }
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_routes(config_path: &Path) -> Result<()> {
    let (config, root) = load_config(config_path)?;
    let declared = SiteSynthesizer::new(config)
        .context("Invalid site config")?
        .declare(&BuildOutput::locate(&root))
        .context("Failed to declare site")?;

    println!("Topology: {}", declared.topology().kind());
    print!("{}", render_route_table(declared.route_table()));
    Ok(())
}

/// One line per behavior, default last.
fn render_route_table(table: &RouteTable) -> String {
    let mut out = String::new();
    for behavior in table
        .behaviors()
        .iter()
        .chain(std::iter::once(table.default_behavior()))
    {
        let origin = match &behavior.origin {
            Origin::FunctionUrl { function, .. } => format!("function:{}", function),
            Origin::Bucket { bucket, key_prefix } => format!("bucket:{}/{}", bucket, key_prefix),
        };
        let edge: Vec<String> = behavior
            .edge_functions
            .iter()
            .map(|a| format!("{:?}:{}", a.event_type, a.function))
            .collect();

        out.push_str(&format!(
            "{:<16} {:<48} {:<12}",
            behavior.path_pattern, origin, behavior.cache_policy.name
        ));
        if !edge.is_empty() {
            out.push_str(&format!(" edge=[{}]", edge.join(", ")));
        }
        out.push('\n');
    }
    out
}

fn cmd_hash(path: &Path) -> Result<()> {
    let digest =
        hash_bundle(path).with_context(|| format!("Failed to hash bundle {:?}", path))?;
    let size = bundle_size(path)?;

    println!("Digest: {}", digest);
    println!("Short: {}", &digest[..12.min(digest.len())]);
    println!("Size: {} bytes", size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_site(dir: &Path, topology: &str) -> PathBuf {
        let out = BuildOutput::locate(dir.join("site"));
        for bundle in [&out.server_bundle, &out.revalidation_bundle, &out.image_bundle] {
            fs::create_dir_all(bundle).unwrap();
            fs::write(bundle.join("index.mjs"), b"export const handler = 1;").unwrap();
        }
        fs::create_dir_all(&out.assets_dir).unwrap();
        fs::create_dir_all(out.build_id_file.parent().unwrap()).unwrap();
        fs::write(&out.build_id_file, "b1").unwrap();

        let config = dir.join("site.toml");
        fs::write(
            &config,
            format!(
                "name = \"docs\"\nbucket = \"docs-assets\"\npath = \"site\"\ntopology = \"{}\"\n",
                topology
            ),
        )
        .unwrap();
        config
    }

    #[tokio::test]
    async fn test_synth_reuses_versions_from_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_site(dir.path(), "edge_replicated");
        let state = dir.path().join(".sitecast/state.json");

        let first = cmd_synth(&config, &state).await.unwrap();
        assert!(state.exists());
        let second = cmd_synth(&config, &state).await.unwrap();

        assert_eq!(first.versions().len(), 1);
        assert_eq!(
            first.versions()[0].identifier,
            second.versions()[0].identifier
        );
        assert_eq!(first.versions()[0].created_at, second.versions()[0].created_at);

        let saved = StateSnapshot::load(&state).unwrap();
        assert_eq!(saved.versions.len(), 1);
        assert_eq!(saved.resources.len(), second.resources().len());
    }

    #[tokio::test]
    async fn test_synth_without_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_site(dir.path(), "regional");
        fs::remove_dir_all(dir.path().join("site/.open-next/server-function")).unwrap();

        let state = dir.path().join("state.json");
        let err = cmd_synth(&config, &state).await.unwrap_err();
        assert!(format!("{:#}", err).contains("server-function"));
        assert!(!state.exists());
    }

    #[test]
    fn test_write_descriptor_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_site(dir.path(), "regional");
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let descriptor = runtime
            .block_on(cmd_synth(&config, &dir.path().join("state.json")))
            .unwrap();

        let out = dir.path().join("descriptor.json");
        write_descriptor(&descriptor, Some(&out)).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(parsed["site"], "docs");
        assert_eq!(parsed["build_id"], "b1");
    }

    #[test]
    fn test_render_route_table_lists_default_last() {
        let dir = tempfile::tempdir().unwrap();
        let (config, root) = load_config(&write_site(dir.path(), "regional")).unwrap();
        let declared = SiteSynthesizer::new(config)
            .unwrap()
            .declare(&BuildOutput::locate(root))
            .unwrap();

        let text = render_route_table(declared.route_table());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("api/*"));
        assert!(lines[2].starts_with("_next/image*"));
        assert!(lines[3].starts_with('*'));
        assert!(lines[3].contains("ServerCache"));
    }

    #[test]
    fn test_load_config_resolves_root_next_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let (config, root) = load_config(&write_site(dir.path(), "regional")).unwrap();
        assert_eq!(config.name, "docs");
        assert_eq!(root, dir.path().join("site"));
    }
}
