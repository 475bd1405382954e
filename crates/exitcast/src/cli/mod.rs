//! CLI subcommands
//!
//! Configuration is resolved before any I/O. Commands that touch the client
//! store open one session, run the stage, and close the session whether the
//! stage succeeded or not.

pub mod error;
pub mod output;

use anyhow::{Context, Result};
use clap::Subcommand;
use exitcast::config::{ArtifactArgs, KeyArgs, SchemaArgs, StoreArgs};
use exitcast::{stages, FeatureTransformer, PipelineError};
use exitcast_db::ClientStore;
use std::future::Future;
use tracing::{info, Instrument};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read open episodes, transform them and publish the feature artifact
    Extract {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Score the feature artifact and publish the prediction artifact
    Infer {
        #[command(flatten)]
        artifacts: ArtifactArgs,
    },

    /// Write the prediction artifact back to open episodes
    Apply {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        artifacts: ArtifactArgs,
    },

    /// Mark predictions of exited clients as `exited`
    Retire {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Extract, infer, apply and retire in one invocation
    Run {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        artifacts: ArtifactArgs,
        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Replace plaintext SSNs in the store with tokens
    Tokenize {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Print the active feature schema
    Schema {
        #[command(flatten)]
        schema: SchemaArgs,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Extract { .. } => "extract",
            Commands::Infer { .. } => "infer",
            Commands::Apply { .. } => "apply",
            Commands::Retire { .. } => "retire",
            Commands::Run { .. } => "run",
            Commands::Tokenize { .. } => "tokenize",
            Commands::Schema { .. } => "schema",
        }
    }
}

pub fn run(command: Commands, json: bool) -> Result<()> {
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("exitcast", run_id = %run_id, command = command.name());
    let _entered = span.enter();

    match command {
        Commands::Extract {
            store,
            artifacts,
            schema,
        } => {
            let config = store.store_config()?;
            let transformer = FeatureTransformer::new(schema.load()?);
            let channel = artifacts.artifact_store()?;
            let objects = artifacts.objects();
            let summary = block_on(with_store(config, |session| async move {
                let result = stages::extract(&session, &transformer, &channel, &objects).await;
                (session, result)
            }))?
            .context("extract stage failed")?;
            output::print_summary("extract", &summary, json)
        }

        Commands::Infer { artifacts } => {
            let channel = artifacts.artifact_store()?;
            let summary = stages::infer(&channel, &artifacts.objects())
                .context("infer stage failed")?;
            output::print_summary("infer", &summary, json)
        }

        Commands::Apply { store, artifacts } => {
            let config = store.store_config()?;
            let channel = artifacts.artifact_store()?;
            let objects = artifacts.objects();
            let summary = block_on(with_store(config, |session| async move {
                let result = stages::apply(&session, &channel, &objects).await;
                (session, result)
            }))?
            .context("apply stage failed")?;
            output::print_summary("apply", &summary, json)
        }

        Commands::Retire { store } => {
            let config = store.store_config()?;
            let summary = block_on(with_store(config, |session| async move {
                let result = stages::retire(&session).await;
                (session, result)
            }))?
            .context("retire stage failed")?;
            output::print_summary("retire", &summary, json)
        }

        Commands::Run {
            store,
            artifacts,
            schema,
        } => {
            let config = store.store_config()?;
            let transformer = FeatureTransformer::new(schema.load()?);
            let channel = artifacts.artifact_store()?;
            let objects = artifacts.objects();
            let summary = block_on(with_store(config, |session| async move {
                let result = stages::run(&session, &transformer, &channel, &objects).await;
                (session, result)
            }))?
            .context("pipeline run failed")?;
            output::print_summary("run", &summary, json)
        }

        Commands::Tokenize { store, key } => {
            let config = store.store_config()?;
            let tokenizer = key.tokenizer()?;
            let summary = block_on(with_store(config, |session| async move {
                let result = stages::tokenize(&session, &tokenizer).await;
                (session, result)
            }))?
            .context("tokenize stage failed")?;
            output::print_summary("tokenize", &summary, json)
        }

        Commands::Schema { schema } => {
            let spec = schema.load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&spec)?);
            } else {
                print!("{}", toml::to_string_pretty(&spec)?);
            }
            Ok(())
        }
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(rt.block_on(future.in_current_span()))
}

/// Open a store session, run `stage`, and close the session on both paths.
///
/// The stage hands the session back alongside its result so the close
/// happens after the stage has released every borrow.
async fn with_store<T, F, Fut>(
    config: exitcast_db::StoreConfig,
    stage: F,
) -> std::result::Result<T, PipelineError>
where
    F: FnOnce(ClientStore) -> Fut,
    Fut: Future<Output = (ClientStore, std::result::Result<T, PipelineError>)>,
{
    let session = ClientStore::connect(config).await?;
    info!(table = %session.table(), "Opened store session");
    let (session, result) = stage(session).await;
    session.close().await;
    result
}
