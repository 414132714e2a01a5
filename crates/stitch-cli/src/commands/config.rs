//! Config command implementation.

use anyhow::{bail, Context, Result};

use stitch_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show { config } => {
            let config = super::load_config(config.as_deref())?;
            let content =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            print!("{content}");
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
        ConfigAction::Init { path, force } => {
            let target = path.clone().unwrap_or_else(Config::config_path);
            if target.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    target.display()
                );
            }
            let config = Config::default();
            match path {
                Some(path) => config.save_to(&path)?,
                None => config.save()?,
            }
            println!("Wrote default configuration to {}", target.display());
        }
    }
    Ok(())
}
