use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use fresnel_core::TaskSpec;
use fresnel_engine::store::redis::RedisStore;
use fresnel_engine::{EngineConfig, Fresnel};

#[derive(Parser)]
#[command(name = "fresnel-cli", version, about = "CLI for the fresnel task queue")]
struct Cli {
    #[arg(long, default_value = "redis://localhost:6379", env = "REDIS_URL")]
    redis_url: String,

    #[arg(long, default_value = "fresnel")]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a task
    Submit {
        #[arg(long)]
        class: String,

        /// JSON array of arguments, e.g. '["alice", 42]'
        #[arg(long, default_value = "[]")]
        args: String,

        /// Delay before the task becomes due, in milliseconds
        #[arg(long)]
        delay_ms: Option<i64>,
    },

    /// Show queue, pending, and failure counts
    Stats,

    /// List retryable failures as (id, attempts)
    Failed {
        #[arg(long, default_value_t = 0)]
        offset: u64,

        #[arg(long, default_value_t = 50)]
        count: u64,
    },

    /// List tasks that exhausted their retries
    Errored {
        #[arg(long, default_value_t = 0)]
        offset: u64,

        #[arg(long, default_value_t = 50)]
        count: u64,
    },

    /// Show the last error message recorded for a task
    LastError { id: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let store = Arc::new(RedisStore::connect(&cli.redis_url).await?);
    let engine = Fresnel::new(store, cli.namespace, EngineConfig::default());

    match cli.command {
        Commands::Submit {
            class,
            args,
            delay_ms,
        } => {
            let args: Vec<serde_json::Value> =
                serde_json::from_str(&args).context("invalid JSON args (expected an array)")?;
            let spec = TaskSpec::new(class, args);

            let created = match delay_ms {
                Some(ms) => {
                    engine
                        .create_task_at(spec, Utc::now() + Duration::milliseconds(ms))
                        .await?
                }
                None => engine.create_task(spec).await?,
            };

            match created {
                Some(def) => println!("{}", def.id),
                None => println!("duplicate"),
            }
        }

        Commands::Stats => {
            println!("queued    {}", engine.get_unbuffered_queue_length().await?);
            println!("pending   {}", engine.get_pending_count().await?);
            println!("retrying  {}", engine.get_failed_count().await?);
            println!("errored   {}", engine.get_errored_out_count().await?);
        }

        Commands::Failed { offset, count } => {
            for (id, attempts) in engine.get_failed_tasks(offset, count).await? {
                println!("{id}\t{attempts}");
            }
        }

        Commands::Errored { offset, count } => {
            for (id, at) in engine.get_errored_out_tasks(offset, count).await? {
                println!("{id}\t{at}");
            }
        }

        Commands::LastError { id } => match engine.get_last_error(id).await? {
            Some(message) => println!("{message}"),
            None => println!("(none)"),
        },
    }

    Ok(())
}
