//! Command-line consumer for the auth synchronizer.
//!
//! Drives a real auth service through the library: marks the session
//! active, watches the derived view settle, and clears it again. Useful for
//! poking at a deployment and as a worked example of the embedding API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use authsync::{
    AuthSync, AuthSyncError, AuthView, HttpIdentityApi, IdentityError, JsonFileStore, ReconciliationPolicy,
    SyncConfig,
};
use clap::{Parser, Subcommand, ValueEnum};

const SETTLE_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("auth state error: {0}")]
    Sync(#[from] AuthSyncError),
    #[error("identity client error: {0}")]
    Identity(#[from] IdentityError),
    #[error("timed out waiting for the identity fetch to settle")]
    Timeout,
}

#[derive(Parser, Debug)]
#[command(name = "authsync-cli", about = "Auth session synchronizer CLI")]
struct Cli {
    #[arg(long, env = "AUTHSYNC_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Directory holding the persisted `auth-storage` entry.
    #[arg(long, env = "AUTHSYNC_STATE_DIR", default_value = ".authsync")]
    state_dir: PathBuf,

    /// Failure reconciliation policy.
    #[arg(long, env = "AUTHSYNC_POLICY", value_enum, default_value_t = PolicyArg::Flag)]
    policy: PolicyArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    /// Fetch failure never touches the persisted flag.
    Flag,
    /// Fetch failure clears the persisted flag.
    Fetch,
}

impl From<PolicyArg> for ReconciliationPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Flag => Self::FlagAuthoritative,
            PolicyArg::Fetch => Self::FetchAuthoritative,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the derived view once reverification settles.
    Status,
    /// Mark the session active and verify it against the server.
    Login,
    /// Invalidate the server session and clear the local flag.
    Logout,
    /// Re-run the identity fetch for the current session.
    Refresh,
    /// Print every view change until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = SyncConfig { base_url: cli.base_url, policy: cli.policy.into(), ..SyncConfig::default() };
    let api = Arc::new(HttpIdentityApi::new(&config)?);
    let store = Arc::new(JsonFileStore::new(cli.state_dir));
    let sync = AuthSync::start(store, api, config.policy)?;

    match cli.command {
        Command::Status => run_status(&sync).await,
        Command::Login => run_login(&sync).await,
        Command::Logout => run_logout(&sync).await,
        Command::Refresh => run_refresh(&sync).await,
        Command::Watch => run_watch(&sync).await,
    }
}

async fn run_status(sync: &AuthSync) -> Result<(), CliError> {
    let view = settled_view(sync).await?;
    print_view(&view);
    Ok(())
}

async fn run_login(sync: &AuthSync) -> Result<(), CliError> {
    sync.set_logged_in(true)?;
    let view = settled_view(sync).await?;
    print_view(&view);
    Ok(())
}

async fn run_logout(sync: &AuthSync) -> Result<(), CliError> {
    sync.logout().await?;
    print_view(&sync.view());
    Ok(())
}

async fn run_refresh(sync: &AuthSync) -> Result<(), CliError> {
    sync.refresh();
    let view = settled_view(sync).await?;
    print_view(&view);
    Ok(())
}

async fn run_watch(sync: &AuthSync) -> Result<(), CliError> {
    let mut rx = sync.subscribe();
    print_view(&rx.borrow_and_update().clone());
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                print_view(&rx.borrow_and_update().clone());
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

/// Wait for any pending identity fetch to resolve, then return the view.
async fn settled_view(sync: &AuthSync) -> Result<AuthView, CliError> {
    let mut rx = sync.subscribe();
    tokio::time::timeout(Duration::from_secs(SETTLE_TIMEOUT_SECS), async move {
        loop {
            let view = rx.borrow_and_update().clone();
            if !view.is_loading {
                return view;
            }
            if rx.changed().await.is_err() {
                return view;
            }
        }
    })
    .await
    .map_err(|_| CliError::Timeout)
}

fn print_view(view: &AuthView) {
    match &view.user {
        Some(user) => println!("logged in as {} <{}> ({} points)", user.name, user.email, user.points),
        None if view.is_loading => println!("verifying session..."),
        None if view.is_error => println!("session verification failed"),
        None => println!("logged out"),
    }
}
