//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{PlygateError, PlygateResult};
use console::style;

const MASK: &str = "********";

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager) -> PlygateResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => {
            let config = manager.load().await?;
            println!("{}", render(&config)?);
        }
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }
    Ok(())
}

/// TOML for display, with the OSS secret masked
fn render(config: &Config) -> PlygateResult<String> {
    let mut shown = config.clone();
    if shown.oss.access_key_secret.is_some() {
        shown.oss.access_key_secret = Some(MASK.to_string());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

async fn init_config(manager: &ConfigManager, force: bool) -> PlygateResult<()> {
    let path = manager.path();
    if path.exists() && !force {
        return Err(PlygateError::ConfigExists(path.to_path_buf()));
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized ({})",
        style("[OK]").green(),
        path.display()
    );
    Ok(())
}
