//! OIDC Client - Command Line
//!
//! Builds authorization URLs and completes authorization callbacks against the
//! provider configured through `OIDC_*` environment variables.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use oidc_client::{
    AuthorizationRequest, CallbackUrl, ClientAuthMode, ClientConfig, ExchangeRequest, OidcClient,
};

#[derive(Parser, Debug)]
#[command(name = "oidc-client")]
#[command(about = "OpenID Connect relying-party client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "RUST_LOG", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an authorization URL and the values to keep for the callback
    Authorize {
        /// Scope to request instead of the configured one
        #[arg(long)]
        scope: Option<String>,

        /// Origin (scheme://host) used when the redirect URI is a path
        #[arg(long)]
        origin: Option<Url>,

        /// Do not send a PKCE challenge
        #[arg(long)]
        no_pkce: bool,
    },

    /// Complete an authorization callback and print the verified claims
    Callback {
        /// Full callback URL the provider redirected to
        #[arg(long)]
        url: String,

        /// State issued by `authorize`
        #[arg(long)]
        state: String,

        /// PKCE verifier issued by `authorize`
        #[arg(long)]
        code_verifier: Option<String>,

        /// Nonce issued by `authorize`
        #[arg(long)]
        nonce: Option<String>,

        /// Send client credentials in the form body instead of Basic auth
        #[arg(long)]
        body_credentials: bool,
    },
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Starting oidc-client");

    let config = ClientConfig::from_env()?;
    let client = OidcClient::new(config)?;

    match cli.command {
        Command::Authorize { scope, origin, no_pkce } => {
            let mut request = AuthorizationRequest::new();
            if let Some(scope) = scope {
                request = request.scope(scope);
            }
            if let Some(origin) = origin {
                request = request.callback_origin(origin);
            }
            if no_pkce {
                request = request.without_pkce();
            }

            let url = client.authorize_url(&request)?;
            let output = serde_json::json!({
                "url": url.as_str(),
                "state": request.state,
                "nonce": request.nonce,
                "code_verifier": request.code_verifier,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Callback { url, state, code_verifier, nonce, body_credentials } => {
            let callback = CallbackUrl::parse(&url)?;
            let mut request = ExchangeRequest::from_callback(&callback, state);
            if let Some(verifier) = code_verifier {
                request = request.with_code_verifier(verifier);
            }
            if let Some(nonce) = nonce {
                request = request.with_nonce(nonce);
            }
            if body_credentials {
                request = request.with_auth_mode(ClientAuthMode::RequestBody);
            }

            match client.authorization_code_token(request).await {
                Ok(claims) => {
                    println!("{}", serde_json::to_string_pretty(&claims)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{}: {e}", e.kind());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
