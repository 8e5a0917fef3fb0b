// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `trellis`: run one operation against a trellis API server and print the
//! decoded result as JSON.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use trellis_client::config::{env, SESSION_CONFIG_KEY};
use trellis_client::{
    ConfigService, Datum, FsConfigStore, HttpTransport, Record, SchemaLookup, Session,
    SessionConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Batched entity API client")]
struct Cli {
    #[command(flatten)]
    connection: Connection,
    #[command(subcommand)]
    command: Command,
}

/// Overrides applied on top of the stored config and environment.
#[derive(Args, Debug, Default)]
struct Connection {
    /// Server base URL
    #[arg(long, global = true)]
    server: Option<String>,
    /// API user name
    #[arg(long, global = true)]
    api_user: Option<String>,
    /// API key
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Endpoint path (default /api)
    #[arg(long, global = true)]
    api_endpoint: Option<String>,
    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the resolved connection settings for later runs
    Configure,
    /// Show server version, timezone support and known entity types
    Info,
    /// Run a query expression
    Query {
        /// e.g. 'select name from Task where status.name is "Done"'
        expression: String,
    },
    /// Create an entity from a JSON object
    Create {
        /// Entity type
        entity_type: String,
        /// Field values as a JSON object
        data: String,
    },
    /// Update an entity by primary key
    Update {
        /// Entity type
        entity_type: String,
        /// Primary-key values, in schema order
        #[arg(required = true)]
        key: Vec<String>,
        /// Field values as a JSON object
        #[arg(long)]
        data: String,
    },
    /// Delete an entity by primary key
    Delete {
        /// Entity type
        entity_type: String,
        /// Primary-key values, in schema order
        #[arg(required = true)]
        key: Vec<String>,
    },
    /// Print the download URL of a component
    ComponentUrl {
        /// Component id
        id: String,
        /// Print the thumbnail URL at this size instead
        #[arg(long)]
        thumbnail: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let store = FsConfigStore::new().map(ConfigService::new);
    let stored = match &store {
        Ok(service) => service
            .load::<SessionConfig>(SESSION_CONFIG_KEY)
            .context("reading stored config")?,
        Err(err) => {
            debug!(%err, "no config store");
            None
        }
    };
    let config = resolve_config(stored, |name| std::env::var(name).ok(), &cli.connection);
    config.validate().context("incomplete connection settings")?;

    if let Command::Configure = cli.command {
        let service = store.context("resolving config directory")?;
        service.save(SESSION_CONFIG_KEY, &config)?;
        info!(server = %config.server_url, "connection settings stored");
        return emit(&json!({"stored": true, "server_url": config.server_url}));
    }

    let transport = HttpTransport::new(&config)?;
    let session = Session::connect(config, transport).context("connecting")?;
    let output = run(&session, cli.command)?;
    emit(&output)
}

/// Stored settings, then environment, then flags.
fn resolve_config(
    stored: Option<SessionConfig>,
    lookup: impl Fn(&str) -> Option<String>,
    flags: &Connection,
) -> SessionConfig {
    let mut config = stored.unwrap_or_else(|| SessionConfig::new("", "", ""));
    let pick = |flag: &Option<String>, var: &str| flag.clone().or_else(|| lookup(var));
    if let Some(v) = pick(&flags.server, env::SERVER) {
        config.server_url = v;
    }
    if let Some(v) = pick(&flags.api_user, env::API_USER) {
        config.api_user = v;
    }
    if let Some(v) = pick(&flags.api_key, env::API_KEY) {
        config.api_key = v;
    }
    if let Some(v) = pick(&flags.api_endpoint, env::API_ENDPOINT) {
        config.api_endpoint = v;
    }
    if let Some(secs) = flags
        .timeout_secs
        .or_else(|| lookup(env::TIMEOUT_SECS).and_then(|t| t.trim().parse().ok()))
    {
        config.timeout_secs = secs;
    }
    config
}

fn run<T: trellis_client::Transport>(session: &Session<T>, command: Command) -> Result<Value> {
    Ok(match command {
        Command::Configure => bail!("configure does not contact the server"),
        Command::Info => {
            let index = session.schema_index();
            json!({
                "server_url": session.config().server_url,
                "version": session.server_version(),
                "timezone_support": index.timezone_support(),
                "entity_types": index.entity_types().collect::<Vec<_>>(),
            })
        }
        Command::Query { expression } => {
            let reply = session.query(expression)?;
            let data: Vec<Value> = reply.result.data.iter().map(|d| reply.to_json(d)).collect();
            json!({"data": data, "metadata": reply.to_json(&Datum::Map(reply.result.metadata.clone()))})
        }
        Command::Create { entity_type, data } => {
            let reply = session.create(entity_type, parse_record(&data)?)?;
            reply.to_json(&reply.result.data)
        }
        Command::Update {
            entity_type,
            key,
            data,
        } => {
            let reply = session.update(entity_type, key, parse_record(&data)?)?;
            reply.to_json(&reply.result.data)
        }
        Command::Delete { entity_type, key } => {
            json!({"deleted": session.delete(entity_type, key)?})
        }
        Command::ComponentUrl { id, thumbnail } => {
            let url = match thumbnail {
                Some(size) => session.thumbnail_url(&id, size)?,
                None => session.component_url(&id)?,
            };
            Value::String(url.into())
        }
    })
}

fn parse_record(text: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(text).context("field data is not valid JSON")?;
    match Datum::from(value) {
        Datum::Map(record) => Ok(record),
        _ => bail!("field data must be a JSON object"),
    }
}

fn emit(value: &Value) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
