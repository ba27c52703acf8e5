// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ledger_auth::callback::{build_router, CallbackState};
use ledger_auth::{AccessTokenProvider, AuthConfig, TokenStore};

/// OAuth2 token lifecycle manager for the accounting API.
#[derive(Debug, Parser)]
#[command(name = "ledger-auth", version)]
struct Cli {
    #[command(flatten)]
    auth: AuthConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a consent URL and its `state` as JSON.
    Authorize {
        /// Use this `state` instead of a random one.
        #[arg(long)]
        state: Option<String>,
        /// Ask the provider to show its tenant picker.
        #[arg(long)]
        select_tenant: bool,
    },
    /// Exchange an authorization code and store the tokens.
    Exchange {
        code: String,
    },
    /// Print a valid access token, refreshing first if needed.
    Token,
    /// Print the current credential status as JSON.
    Status,
    /// Discard stored credentials.
    Logout,
    /// Run the local redirect receiver.
    Serve {
        /// Address to listen on; must match the registered redirect URI.
        #[arg(long, env = "LEDGER_LISTEN", default_value = "127.0.0.1:8765")]
        listen: String,
        /// Ask the provider to show its tenant picker by default.
        #[arg(long)]
        select_tenant: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.auth.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli.auth);

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &AuthConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so command output on stdout stays machine-readable.
    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = TokenStore::new(cli.auth.token_path());
    let provider =
        AccessTokenProvider::new(cli.auth.to_oauth_config(), cli.auth.provider_options(), store)?;

    match cli.command {
        Command::Authorize { state, select_tenant } => {
            let request = provider.authorization_url(state.as_deref(), select_tenant);
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Command::Exchange { code } => {
            provider.exchange_code(&code).await.map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", serde_json::to_string_pretty(&provider.status())?);
        }
        Command::Token => {
            let token = provider
                .get_valid_access_token()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{token}");
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&provider.status())?);
        }
        Command::Logout => {
            provider.logout();
        }
        Command::Serve { listen, select_tenant } => serve(provider, &listen, select_tenant).await?,
    }
    Ok(())
}

async fn serve(
    provider: AccessTokenProvider,
    listen: &str,
    select_tenant: bool,
) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let router = build_router(Arc::new(CallbackState::new(provider, select_tenant)));
    let listener = TcpListener::bind(listen).await?;
    info!("callback receiver listening on http://{}", listener.local_addr()?);

    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT");
                }
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM");
                }
            }
            sd.cancel();
        });
    }

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    info!("callback receiver stopped");
    Ok(())
}
