use crate::output::print_json;
use anyhow::Context;
use boardsync_core::config::SyncConfig;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Check that the configuration parses and is complete
    Validate,
    /// Print the resolved configuration
    Show,
}

pub fn run(config_path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    let config = SyncConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match subcmd {
        ConfigSubcommand::Validate => {
            println!(
                "configuration OK: {} board(s), {} repositories",
                config.boards.len(),
                config.boards.iter().map(|b| b.repos.len()).sum::<usize>()
            );
        }
        ConfigSubcommand::Show => {
            if json {
                print_json(&config)?;
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
            }
        }
    }
    Ok(())
}
