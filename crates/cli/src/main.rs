mod reminder_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    fittrack_config::FitTrackConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "fittrack", about = "Fit Track backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (defaults to ./fittrack.toml or the user config dir).
    #[arg(long, global = true, env = "FITTRACK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway.
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Reminder settings.
    Reminders {
        #[command(subcommand)]
        action: reminder_commands::ReminderAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "fittrack starting");
    let mut config = fittrack_config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Gateway { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            fittrack_gateway::server::start_gateway(config).await
        },
        Commands::Reminders { action } => {
            reminder_commands::handle_reminders(action, &config).await
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => show_config(&config),
        },
    }
}

fn show_config(config: &FitTrackConfig) -> anyhow::Result<()> {
    let auth = &config.auth;
    let anon_key = if auth.anon_key.is_some() { "set" } else { "unset" };
    let view = serde_json::json!({
        "server": config.server,
        "auth": {
            "supabase_url": auth.supabase_url,
            "anon_key": anon_key,
            "default_next": auth.default_next,
            "error_page": auth.error_page,
            "exchange_timeout_secs": auth.exchange_timeout_secs,
            "consumed_ttl_secs": auth.consumed_ttl_secs,
            "providers": auth.providers,
        },
        "reminders": config.reminders,
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
