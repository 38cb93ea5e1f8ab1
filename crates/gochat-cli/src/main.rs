//! Command-line interface for the GoChat client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gochat_client::auth_check;
use gochat_client::{
    AuthCheckReport, AuthClient, AuthSession, ChannelConsumer, ChatEvent, ConnectionManager,
    Credentials,
};
use gochat_core::config::{env_vars, ClientConfig};
use rand::Rng;

/// GoChat client - join a chat room over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "gochat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Join a room and print incoming messages until Ctrl-C.
    Chat {
        /// Room to join.
        #[arg(short, long)]
        room: i64,
        /// Session token from a previous login.
        #[arg(long, requires = "user_id", conflicts_with_all = ["username", "password"])]
        token: Option<String>,
        /// User id the token belongs to.
        #[arg(long, requires = "token")]
        user_id: Option<i64>,
        /// Log in with this username instead of passing a token.
        #[arg(short, long, requires = "password")]
        username: Option<String>,
        /// Password for --username.
        #[arg(short, long, requires = "username")]
        password: Option<String>,
        /// WebSocket endpoint, overriding the configuration.
        #[arg(long)]
        ws_url: Option<String>,
    },
    /// Exercise the account endpoints end to end.
    AuthCheck {
        /// Username to register; generated when omitted.
        #[arg(short, long)]
        username: Option<String>,
        /// Password for the test account.
        #[arg(short, long, default_value = "password123")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::from_env().context("Invalid environment configuration")?,
    };

    match args.command {
        Command::Chat {
            room,
            token,
            user_id,
            username,
            password,
            ws_url,
        } => {
            let login = match (token, user_id, username, password) {
                (Some(token), Some(user_id), _, _) => Login::Token { token, user_id },
                (_, _, Some(username), Some(password)) => Login::Password { username, password },
                _ => anyhow::bail!(
                    "Pass either --token with --user-id, or --username with --password"
                ),
            };
            run_chat(config, room, login, ws_url).await
        }
        Command::AuthCheck { username, password } => {
            let username = username.unwrap_or_else(generated_username);
            run_auth_check(&config, &username, &password).await
        }
    }
}

fn init_tracing(verbose: bool) {
    // Check if JSON logging is requested (for production/container environments)
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "gochat={0},gochat_core={0},gochat_client={0},warn",
            default_level
        ))
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

/// How the chat command obtains its identity.
#[derive(Debug)]
enum Login {
    Token { token: String, user_id: i64 },
    Password { username: String, password: String },
}

async fn resolve_credentials(
    config: &ClientConfig,
    room: i64,
    login: Login,
) -> Result<Credentials> {
    match login {
        Login::Token { token, user_id } => Ok(Credentials::new(user_id, room, token)),
        Login::Password { username, password } => {
            let session = AuthClient::from_config(config)
                .login(&username, &password)
                .await
                .context("Login failed")?;
            let user_id = match session.user_id {
                Some(id) => id,
                None => lookup_user_id(config, &session).await?,
            };
            Ok(Credentials::new(user_id, room, session.token))
        }
    }
}

/// Login responses do not always carry the user id; checkAuth does.
async fn lookup_user_id(config: &ClientConfig, session: &AuthSession) -> Result<i64> {
    let checked = AuthClient::from_config(config)
        .check_auth(&session.token)
        .await
        .context("Token check failed")?;
    checked
        .user_id
        .ok_or_else(|| anyhow::anyhow!("Server did not report a user id for {}", session.username))
}

/// Run an interactive chat session.
async fn run_chat(
    config: ClientConfig,
    room: i64,
    login: Login,
    ws_url: Option<String>,
) -> Result<()> {
    let credentials = resolve_credentials(&config, room, login).await?;
    let endpoint = ws_url.unwrap_or_else(|| config.ws_url.clone());

    println!("GoChat - Room {}", room);
    println!("Connecting to {} as user {}...", endpoint, credentials.user_id);
    println!("Press Ctrl-C to leave.\n");

    let (consumer, mut events) = ChannelConsumer::new(config.event_channel_capacity);
    let manager = Arc::new(ConnectionManager::websocket(config, Arc::new(consumer)));

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let interrupt = tokio::spawn({
        let manager = manager.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nLeaving room...");
                manager.disconnect().await;
            }
        }
    });

    let outcome = manager.connect(&endpoint, &credentials).await;
    interrupt.abort();
    // Dropping the manager closes the event channel and ends the printer.
    let metrics = manager.metrics();
    drop(manager);
    let _ = printer.await;

    outcome.context("Connection failed")?;
    if let Ok(summary) = serde_json::to_string_pretty(&metrics) {
        tracing::debug!("session metrics: {}", summary);
    }
    println!(
        "Session ended: {} messages, {} room updates.",
        metrics.chat_messages, metrics.room_updates
    );
    Ok(())
}

fn print_event(event: &ChatEvent) {
    let now = chrono::Local::now().format("%H:%M:%S");
    match event {
        ChatEvent::Message(message) => {
            println!("[{}] {}: {}", now, message.from_user_name, message.message);
        }
        ChatEvent::RoomInfo(info) => {
            println!(
                "[{}] room {} now has {} users: {}",
                now,
                info.room_id,
                info.count,
                info.user_names().join(", ")
            );
        }
    }
}

fn generated_username() -> String {
    let mut rng = rand::thread_rng();
    (0..8).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Run the account endpoint checks and print a pass/fail summary.
async fn run_auth_check(config: &ClientConfig, username: &str, password: &str) -> Result<()> {
    let client = AuthClient::from_config(config);
    println!("GoChat auth check against {}", client.base_url());
    println!("Test user: {}\n", username);

    let report = auth_check::run(&client, username, password).await;
    print_report(&report);

    if !report.all_passed() {
        anyhow::bail!(
            "{} of {} auth checks failed",
            report.total() - report.passed(),
            report.total()
        );
    }
    Ok(())
}

fn print_report(report: &AuthCheckReport) {
    println!("===== Results =====");
    for step in &report.steps {
        let status = if step.passed { "PASS" } else { "FAIL" };
        println!("{:<32} {}  {}", step.name, status, step.detail);
    }
    let rate = if report.total() == 0 {
        0.0
    } else {
        report.passed() as f64 * 100.0 / report.total() as f64
    };
    println!(
        "\nPass rate: {:.2}% ({}/{})",
        rate,
        report.passed(),
        report.total()
    );
}
