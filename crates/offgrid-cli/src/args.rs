use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "offgrid", version, about = "Inspect and maintain the offline store")]
pub struct Cli {
    /// Database file (overrides the config file and OFFGRID_DATABASE)
    #[arg(long, global = true, value_name = "FILE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Saved form drafts
    #[command(subcommand)]
    Drafts(DraftsCommand),
    /// Expiring cache entries
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Store statistics and network snapshot as JSON
    Status {
        /// Probe the configured URL before reporting network state
        #[arg(long)]
        probe: bool,
    },
    /// Run the cache sweeper and connectivity probe until Ctrl-C
    Watch,
    /// Saved configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration, overrides included
    Show,
    /// Change saved settings; omitted flags keep their current value
    Set(ConfigChanges),
}

#[derive(Args, Debug, Default)]
pub struct ConfigChanges {
    #[arg(long, value_name = "FILE")]
    pub database_path: Option<PathBuf>,
    #[arg(long, value_name = "URL")]
    pub probe_url: Option<String>,
    #[arg(long, value_name = "SECS")]
    pub default_cache_ttl_secs: Option<u64>,
    #[arg(long, value_name = "SECS")]
    pub sweep_interval_secs: Option<u64>,
    #[arg(long, value_name = "SECS")]
    pub probe_interval_secs: Option<u64>,
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum DraftsCommand {
    /// Most recently saved first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    Show {
        id: String,
    },
    /// Save (or overwrite) a draft from a JSON document
    Save {
        id: String,
        json: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    Get {
        key: String,
    },
    Put {
        key: String,
        json: String,
        /// Lifetime in seconds; the configured default applies when omitted
        #[arg(long, value_name = "SECS")]
        ttl_secs: Option<u64>,
    },
    /// Invalidate one key
    Drop {
        key: String,
    },
    /// Remove every expired entry now
    Sweep,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_cache_put_with_ttl() {
        let cli = Cli::try_parse_from(["offgrid", "cache", "put", "roster", "[1,2]", "--ttl-secs", "90"]).unwrap();
        match cli.command {
            Commands::Cache(CacheCommand::Put { key, json, ttl_secs }) => {
                assert_eq!(key, "roster");
                assert_eq!(json, "[1,2]");
                assert_eq!(ttl_secs, Some(90));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_database_flag() {
        let cli = Cli::try_parse_from(["offgrid", "drafts", "list", "--database", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.command, Commands::Drafts(DraftsCommand::List { limit: 20 })));
    }

    #[test]
    fn test_parses_config_set() {
        let cli = Cli::try_parse_from(["offgrid", "config", "set", "--probe-url", "https://example.org/ping"]).unwrap();
        match cli.command {
            Commands::Config(ConfigCommand::Set(changes)) => {
                assert_eq!(changes.probe_url.as_deref(), Some("https://example.org/ping"));
                assert_eq!(changes.database_path, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
