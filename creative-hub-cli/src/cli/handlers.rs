use anyhow::{Context, Result};
use creative_hub_core::client::DEFAULT_SERVER_URL;
use creative_hub_core::models::{stages, Configuration};
use creative_hub_core::server::HubServer;
use creative_hub_core::services::init_logging;
use std::path::PathBuf;

/// Resolve `--config-file`; empty means the default location
pub fn resolve_config_path(config_file: &str) -> Result<PathBuf> {
    if config_file.is_empty() {
        return Configuration::default_config_path()
            .context("Failed to get default config path");
    }
    if let Some(rest) = config_file.strip_prefix("~/") {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(config_file))
}

/// Load configuration, falling back to defaults when the file is missing
pub fn load_config(config_file: &str) -> Result<(PathBuf, Configuration)> {
    let path = resolve_config_path(config_file)?;
    let config = Configuration::load_from_file(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok((path, config))
}

/// Server URL from `--server`, or the default local server
pub fn server_url(server: &str) -> String {
    if server.is_empty() {
        DEFAULT_SERVER_URL.to_string()
    } else {
        server.to_string()
    }
}

/// Handle the 'serve' command
pub async fn handle_serve(host: Option<String>, port: Option<u16>, config_file: String) -> Result<()> {
    let (path, mut config) = load_config(&config_file)?;
    if let Some(host) = host {
        config.server_host = host;
    }
    if let Some(port) = port {
        config.server_port = port;
    }

    init_logging(config.log_level)?;
    tracing::info!(config = %path.display(), "Loaded configuration");

    let server = HubServer::new(config)?;
    server.start().await
}

/// Handle the 'config' command: show the effective config, or write it with `--init`
pub async fn handle_config(init: bool, config_file: String) -> Result<()> {
    let (path, config) = load_config(&config_file)?;

    if let Err(errors) = config.validate() {
        println!("⚠️  Configuration has problems:");
        for error in &errors {
            println!("  - {}", error);
        }
        if init {
            anyhow::bail!("Refusing to write an invalid configuration");
        }
    }

    if init {
        let existed = path.exists();
        config.save_to_file(&path)?;
        if existed {
            println!("✅ Configuration rewritten: {}", path.display());
        } else {
            println!("✨ Configuration created with defaults: {}", path.display());
        }
        return Ok(());
    }

    println!("📄 Config file: {}", path.display());
    if !path.exists() {
        println!("   (not found, showing defaults; run with --init to create it)");
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    print!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render configuration")?
    );
    Ok(())
}

/// Handle the 'stages' command
pub async fn handle_stages(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stages())?);
        return Ok(());
    }

    println!("Creative workflow stages:");
    for (i, stage) in stages().iter().enumerate() {
        println!(
            "  {}. {:<10} {} - {}",
            i + 1,
            stage.id.as_str(),
            stage.title,
            stage.description
        );
    }
    Ok(())
}
