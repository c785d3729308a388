use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use offgrid_core::format::{expiry_display, relative_age};
use offgrid_core::store::SCHEMA_VERSION;
use offgrid_core::{
    spawn_probe_watch, spawn_sweeper, Config, EventBus, HttpProbe, NetworkStatusMonitor, PersistenceStore,
};

use crate::args::{CacheCommand, ConfigChanges, ConfigCommand, DraftsCommand};

const NOT_FOUND: &str = "not found";

pub async fn open_store(config: &Config) -> Result<Arc<PersistenceStore>> {
    let location = config.store_location()?;
    let store = PersistenceStore::new(location).with_default_ttl(config.default_cache_ttl());
    store.initialize().await.context("Failed to open the offline store")?;
    Ok(Arc::new(store))
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).context("Argument is not valid JSON")
}

pub async fn drafts(config: &Config, command: DraftsCommand) -> Result<()> {
    let store = open_store(config).await?;

    match command {
        DraftsCommand::List { limit } => {
            let now = Utc::now();
            let drafts = store.recent_drafts(limit).await?;
            if drafts.is_empty() {
                println!("no drafts");
            }
            for draft in drafts {
                println!("{}\t{}\t{}", draft.id, relative_age(draft.saved_at, now), draft.payload);
            }
        }
        DraftsCommand::Show { id } => match store.get_draft::<Value>(&id).await? {
            Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
            None => println!("{}", NOT_FOUND),
        },
        DraftsCommand::Save { id, json } => {
            let payload = parse_json(&json)?;
            store.save_draft(&id, &payload).await?;
            info!(id = %id, "Draft saved");
            println!("saved {}", id);
        }
        DraftsCommand::Delete { id } => {
            store.delete_draft(&id).await?;
            println!("deleted {}", id);
        }
    }

    Ok(())
}

pub async fn cache(config: &Config, command: CacheCommand) -> Result<()> {
    let store = open_store(config).await?;

    match command {
        CacheCommand::Get { key } => match store.get_cache_entry(&key).await? {
            Some(entry) => {
                println!("{}", serde_json::to_string_pretty(&entry.value)?);
                eprintln!("({})", expiry_display(entry.expires_at, Utc::now()));
            }
            None => println!("{}", NOT_FOUND),
        },
        CacheCommand::Put { key, json, ttl_secs } => {
            let value = parse_json(&json)?;
            match ttl_secs {
                Some(secs) => store.cache_data_with_ttl(&key, &value, Duration::from_secs(secs)).await?,
                None => store.cache_data(&key, &value).await?,
            }
            println!("cached {}", key);
        }
        CacheCommand::Drop { key } => {
            store.remove_cached_data(&key).await?;
            println!("dropped {}", key);
        }
        CacheCommand::Sweep => {
            let removed = store.clear_expired_cache().await?;
            println!("removed {} expired entries", removed);
        }
    }

    Ok(())
}

fn probe_for(config: &Config) -> Result<Arc<HttpProbe>> {
    let url = config
        .probe_url
        .as_deref()
        .context("No probe URL configured (set probe_url in config.json or OFFGRID_PROBE_URL)")?;
    Ok(Arc::new(HttpProbe::new(url)?))
}

pub async fn status(config: &Config, probe: bool) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await?;

    let network = if probe {
        let probe = probe_for(config)?;
        probe.check().await;
        let monitor = NetworkStatusMonitor::new(probe, EventBus::new());
        serde_json::to_value(monitor.get_network_status())?
    } else {
        Value::Null
    };

    let report = json!({
        "database": config.database_path()?,
        "schemaVersion": SCHEMA_VERSION,
        "store": stats,
        "network": network,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn watch(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let bus = EventBus::new();
    let mut events = bus.subscribe();

    let sweeper = spawn_sweeper(store, config.sweep_interval());
    let probe_watch = match probe_for(config) {
        Ok(probe) => {
            let monitor = Arc::new(NetworkStatusMonitor::new(probe.clone(), bus.clone()));
            Some(spawn_probe_watch(monitor, probe, config.probe_interval()))
        }
        Err(e) => {
            warn!(error = %e, "Connectivity probe disabled");
            eprintln!("{:#} - only sweeping the cache", e);
            None
        }
    };

    info!(sweeper = sweeper.name(), probing = probe_watch.is_some(), "Watching");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed network events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(task) = probe_watch {
        task.stop();
    }
    sweeper.stop();
    info!("Watch stopped");
    Ok(())
}

/// Overlay the flags that were given onto `config`.
fn apply_changes(mut config: Config, changes: ConfigChanges) -> Config {
    if let Some(path) = changes.database_path {
        config.database_path = Some(path);
    }
    if let Some(url) = changes.probe_url {
        config.probe_url = Some(url);
    }
    if let Some(secs) = changes.default_cache_ttl_secs {
        config.default_cache_ttl_secs = secs;
    }
    if let Some(secs) = changes.sweep_interval_secs {
        config.sweep_interval_secs = secs;
    }
    if let Some(secs) = changes.probe_interval_secs {
        config.probe_interval_secs = secs;
    }
    if let Some(dir) = changes.log_dir {
        config.log_dir = Some(dir);
    }
    config
}

pub fn config(effective: &Config, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => println!("{}", serde_json::to_string_pretty(effective)?),
        ConfigCommand::Set(changes) => {
            // Start from the file, not the effective config, so env overrides are not persisted
            let updated = apply_changes(Config::load()?, changes);
            updated.save().context("Failed to save config")?;
            info!("Config saved");
            println!("saved {}", Config::config_path()?.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            database_path: Some(dir.join("cli.db")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_commands_share_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        drafts(
            &config,
            DraftsCommand::Save {
                id: "d1".to_string(),
                json: r#"{"title": "fence repair"}"#.to_string(),
            },
        )
        .await
        .unwrap();
        cache(
            &config,
            CacheCommand::Put {
                key: "k".to_string(),
                json: "42".to_string(),
                ttl_secs: Some(0),
            },
        )
        .await
        .unwrap();

        let store = open_store(&config).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.drafts, 1);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(store.get_cached_data::<Value>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let result = drafts(
            &config,
            DraftsCommand::Save {
                id: "d1".to_string(),
                json: "{not json".to_string(),
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_status_probe_requires_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(status(&config, true).await.is_err());
        assert!(status(&config, false).await.is_ok());
    }

    #[test]
    fn test_config_changes_keep_unset_fields() {
        let saved = Config {
            probe_url: Some("https://old.example/ping".to_string()),
            sweep_interval_secs: 60,
            ..Default::default()
        };

        let updated = apply_changes(
            saved,
            ConfigChanges {
                default_cache_ttl_secs: Some(120),
                ..Default::default()
            },
        );

        assert_eq!(updated.default_cache_ttl_secs, 120);
        assert_eq!(updated.sweep_interval_secs, 60);
        assert_eq!(updated.probe_url.as_deref(), Some("https://old.example/ping"));
    }
}
