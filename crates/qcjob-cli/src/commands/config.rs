use super::GlobalOptions;
use crate::cli::{ConfigArgs, ConfigCommands};
use crate::config;
use crate::error::Result;

pub async fn run(args: ConfigArgs, globals: GlobalOptions<'_>) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            let path = globals
                .config
                .map(|p| p.to_path_buf())
                .or_else(config::default_config_path);
            match path {
                Some(path) if path.exists() => println!("{}", path.display()),
                Some(path) => println!("{} (not present, using defaults)", path.display()),
                None => println!("No configuration directory available on this platform."),
            }
        }
        ConfigCommands::Show => {
            let effective = config::resolve(globals.config, globals.set_values)?;
            print!("{}", effective.to_toml()?);
        }
    }
    Ok(())
}
