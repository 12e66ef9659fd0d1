//! `uql-demo`: command-line consumer of the UQL client.
//!
//! Local storage (the auth token) and session storage (the offline cache)
//! are JSON files under the data directory. `--keychain` moves the token
//! into the OS keychain instead.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use uql_client::api::auth;
use uql_client::{
    Attachment, CallInput, CallOutput, ClientConfig, FileStorage, Fields, KeychainStorage, Session,
    Storage, UqlClient, UserState,
};

#[derive(Parser, Debug)]
#[command(name = "uql-demo", version, about = "Call a UQL endpoint from the command line")]
struct Args {
    /// Directory holding local.json and session.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep the auth token in the OS keychain instead of local.json
    #[arg(long, global = true)]
    keychain: bool,

    /// Endpoint URL (overrides UQL_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch one call and print the envelope
    Call {
        #[arg(long)]
        intent: String,
        /// Cache id for offline replay
        #[arg(long)]
        id: Option<String>,
        /// Arguments as JSON
        #[arg(long)]
        args: Option<String>,
        /// Field selection as JSON, or $all
        #[arg(long)]
        fields: Option<String>,
        /// Extra header, NAME=VALUE (repeatable)
        #[arg(long = "header", value_parser = parse_key_value)]
        headers: Vec<(String, String)>,
        /// Send the stored auth token
        #[arg(long)]
        auth: bool,
        /// Answer from the offline cache if the endpoint is unreachable
        #[arg(long)]
        offline_fallback: bool,
        /// File part, FIELD=PATH (repeatable); switches to a multipart body
        #[arg(long = "attach", value_parser = parse_key_value)]
        attachments: Vec<(String, String)>,
    },
    /// Create an account and store its token
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and store the token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored token
    Logout,
    /// Resolve the current user from the stored token
    Whoami,
    /// Inspect or edit the offline cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    List,
    Remove { id: String },
    Clear,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", raw))
}

fn parse_fields(raw: &str) -> Result<Fields, String> {
    if raw.trim() == uql_client::api::types::ALL_FIELDS {
        return Ok(Fields::All);
    }
    serde_json::from_str(raw).map_err(|e| format!("Invalid --fields: {}", e))
}

fn read_attachment(field: String, path: &str) -> Result<Attachment, String> {
    let path = Path::new(path);
    let bytes =
        std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Attachment {
        field,
        file_name,
        bytes,
        mime: None,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to format output: {}", e))?;
    println!("{}", out);
    Ok(())
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("uql-demo"))
        .unwrap_or_else(|| PathBuf::from(".uql-demo"))
}

async fn run(args: Args) -> Result<(), String> {
    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    let local: Arc<dyn Storage> = if args.keychain {
        Arc::new(KeychainStorage::default())
    } else {
        Arc::new(FileStorage::new(data_dir.join("local.json")))
    };
    let session_store: Arc<dyn Storage> = Arc::new(FileStorage::new(data_dir.join("session.json")));

    let mut config = ClientConfig::from_env();
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    log::debug!("Using endpoint {} (data dir {})", config.endpoint, data_dir.display());

    let api = UqlClient::new(&config, session_store);
    let session = Session::new(api, local.clone());

    match args.command {
        Command::Call {
            intent,
            id,
            args: call_args,
            fields,
            headers,
            auth: with_auth,
            offline_fallback,
            attachments,
        } => {
            let mut input: CallInput = CallInput::new(&intent).offline_fallback(offline_fallback);
            if let Some(id) = id {
                input = input.id(&id);
            }
            if let Some(raw) = call_args {
                let parsed: Value =
                    serde_json::from_str(&raw).map_err(|e| format!("Invalid --args: {}", e))?;
                input = input.args(parsed);
            }
            if let Some(raw) = fields {
                input = input.fields(parse_fields(&raw)?);
            }
            for (name, value) in headers {
                input = input.header(&name, &value);
            }
            if with_auth {
                let (name, value) = auth::auth_header(local.as_ref()).map_err(|e| e.to_string())?;
                input = input.header(name, &value);
            }
            for (field, path) in attachments {
                input = input.attach(read_attachment(field, &path)?);
            }

            let out: CallOutput = session.api().call(&input).await;
            print_json(&out)
        }
        Command::Signup { email, password } => print_json(&session.signup(&email, &password).await),
        Command::Login { email, password } => print_json(&session.login(&email, &password).await),
        Command::Logout => {
            session
                .logout()
                .await
                .map_err(|e| format!("Logout failed: {}", e))?;
            println!("Logged out");
            Ok(())
        }
        Command::Whoami => match session.bootstrap().await {
            UserState::Authenticated(user) => print_json(&user),
            other => {
                println!("{}", other.label());
                Ok(())
            }
        },
        Command::Cache { action } => {
            let cache = session.api().cache();
            match action {
                CacheAction::List => {
                    let entries = cache.read_all().map_err(|e| e.to_string())?;
                    print_json(&entries)
                }
                CacheAction::Remove { id } => {
                    cache
                        .write::<Value>(&id, None)
                        .map_err(|e| e.to_string())?;
                    println!("Removed {}", id);
                    Ok(())
                }
                CacheAction::Clear => {
                    cache.clear().map_err(|e| e.to_string())?;
                    println!("Cache cleared");
                    Ok(())
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Picks up UQL_ENDPOINT or the web frontend's VITE_UQL_ROOT from .env
    let _ = dotenvy::dotenv();

    env_logger::init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
