use anyhow::{Context, Result};
use galaxy_sectors::config::{Config, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;

pub async fn init_config(path: PathBuf) -> Result<()> {
    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        anyhow::bail!("Config file already exists: {}", config_path.display());
    }

    let toml_content = format!(
        "# Galaxy Sectors Configuration\n\n{}",
        Config::default().to_toml()?
    );

    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    std::fs::write(&config_path, toml_content)?;

    println!("Created configuration file: {}", config_path.display());
    println!("\nNext steps:");
    println!("  galaxy-sectors build <galaxy.json.gz>");
    println!("  galaxy-sectors update <galaxy_1day.json.gz>");
    println!("  galaxy-sectors verify");

    Ok(())
}
