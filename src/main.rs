use std::path::PathBuf;
use std::time::Duration;
use anyhow::Context;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use redis_backup::backup::{self, Backup};
use redis_backup::config::Config;
use redis_backup::enumerator::KeyEnumerator;
use redis_backup::inspector;
use redis_backup::restorer::Restorer;
use redis_backup::snapshot::{self, Snapshot};
use redis_backup::store::RemoteStore;
use redis_backup::types::NO_EXPIRY;
use redis_backup::utils::sync::Notifier;

/// Back up, restore and inspect the keys of a Redis database.
#[derive(Parser, Debug)]
#[clap(name = "redis-backup", version)]
struct Cli {
    #[clap(flatten)]
    connection: ConnectionArgs,

    #[clap(subcommand)]
    action: Action,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// redis://[user[:password]@]host[:port][/db]
    #[clap(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    url: String,

    #[clap(long, env = "REDIS_USERNAME")]
    username: Option<String>,

    #[clap(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[clap(long, env = "REDIS_DB")]
    db: Option<u32>,

    /// Directory snapshots are written to
    #[clap(long, env = "BACKUP_DIR", default_value = "./backups/redis")]
    backup_dir: PathBuf,

    #[clap(long, env = "REDIS_CONNECT_TIMEOUT_MS", default_value = "30000")]
    connect_timeout_ms: u64,

    /// Limit for every store round trip
    #[clap(long, env = "REDIS_COMMAND_TIMEOUT_MS", default_value = "5000")]
    command_timeout_ms: u64,

    #[clap(long, env = "REDIS_CONNECT_RETRIES", default_value = "5")]
    connect_retries: u32,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Capture the keys matching a pattern into a snapshot file
    Backup {
        #[clap(long, alias = "padrao", default_value = "*")]
        pattern: String,
        /// Keep only the newest N snapshot files
        #[clap(long)]
        keep: Option<usize>,
    },
    /// Replay a snapshot file, overwriting the keys it contains
    Restore {
        #[clap(long, alias = "arquivo")]
        file: PathBuf,
    },
    /// Print the keys matching a pattern with their type, TTL and value
    View {
        #[clap(long, alias = "padrao", default_value = "*")]
        pattern: String,
    },
}

impl ConnectionArgs {
    fn into_config(self) -> Config {
        Config {
            url: self.url,
            username: self.username,
            password: self.password,
            db: self.db,
            backup_dir: self.backup_dir,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            connect_retries: self.connect_retries,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.connection.into_config();
    let endpoint = config.endpoint()?;

    let shutdown = Notifier::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current key");
            trigger.notify_all();
        }
    });

    let mut store = RemoteStore::connect(&config)
        .await
        .with_context(|| format!("cannot connect to {}", endpoint.addr()))?;
    match store.server_info(endpoint.db).await {
        Ok(info) => tracing::info!(%info, "server"),
        Err(e) => warn!(error = %e, "INFO unavailable"),
    }

    let enumerator = |pattern: String| KeyEnumerator::new(pattern).with_count(config.scan_count);

    match cli.action {
        Action::Backup { pattern, keep } => {
            let (snapshot, report) = Backup::new(&mut store, enumerator(pattern))
                .with_shutdown(shutdown)
                .capture()
                .await?;
            print_failures(&report.failures);
            for (key, type_name) in &report.unsupported {
                println!("  skipped {} (unsupported type {})", key, type_name);
            }
            if report.interrupted {
                println!("Backup interrupted, no snapshot written: {}", report);
                return Ok(());
            }
            let path = backup::write_snapshot(&snapshot, &config.backup_dir, Local::now())
                .await
                .with_context(|| format!("cannot write snapshot to {}", config.backup_dir.display()))?;
            if let Some(keep) = keep {
                backup::prune(&config.backup_dir, keep).await?;
            }
            println!("Backup written to {}", path.display());
            println!("Keys: {}", report);
        }
        Action::Restore { file } => {
            let bytes = backup::read_snapshot(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let decoded = Snapshot::decode_lenient(&bytes).with_context(|| format!("cannot decode {}", file.display()))?;
            let report = Restorer::new(&mut store)
                .with_shutdown(shutdown)
                .restore_decoded(decoded)
                .await?;
            print_failures(&report.failures);
            println!("Restored {}", file.display());
            println!("Keys: {}", report);
        }
        Action::View { pattern } => {
            let records = inspector::inspect(&mut store, &enumerator(pattern), Some(&shutdown)).await?;
            for record in &records {
                println!();
                println!("Key:   {}", record.key);
                println!("Type:  {}", record.type_tag());
                if record.ttl_seconds == NO_EXPIRY {
                    println!("TTL:   no expiration");
                } else {
                    println!("TTL:   {}s", record.ttl_seconds);
                }
                let value = snapshot::encode_value(&record.key, &record.value)?;
                println!("Value: {}", serde_json::to_string_pretty(&value)?);
            }
            println!();
            println!("Keys: {}", records.len());
        }
    }
    Ok(())
}

fn print_failures(failures: &[(String, String)]) {
    for (key, reason) in failures {
        println!("  failed {}: {}", key, reason);
    }
}
