use std::path::Path;

use anyhow::Result;

use captionfuse::config;

pub fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let effective = config::load(config_path)?;

    match config_path {
        Some(path) => eprintln!("📄 Config: {}", path.display()),
        None if config::config_path().exists() => {
            eprintln!("📄 Config: {}", config::config_path().display());
        }
        None => eprintln!("📄 Config: built-in defaults"),
    }

    print!("{}", effective.to_toml()?);
    Ok(())
}
