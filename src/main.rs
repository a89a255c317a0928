use clap::Parser;
use expense_core::{
    adapters::{PostgresApprovalRepository, PostgresExpenseRepository},
    cli::{Cli, Commands, DbCommands, TokenCommands},
    config::{Config, LogFormat},
    create_app, cors_layer, db,
    health::{PaymentGatewayChecker, PostgresChecker},
    middleware::JwtConfig,
    payment::PaymentClient,
    services::SettlementWorker,
    use_cases::ExpenseLifecycle,
    AppState, HealthCheckers,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_default() {
        Commands::Serve { with_worker } => serve(load_config()?, with_worker).await,
        Commands::Worker => run_worker(load_config()?).await,
        Commands::Db(DbCommands::Migrate) => {
            expense_core::cli::handle_db_migrate(&load_config()?).await
        }
        Commands::Config => expense_core::cli::handle_config_validate(&load_config()?).await,
        // Only the signing secret is needed, and stdout carries nothing but the token.
        Commands::Token(TokenCommands::Issue {
            user_id,
            role,
            ttl_hours,
        }) => {
            let secret = Config::jwt_secret_from_env()?;
            expense_core::cli::handle_token_issue(&secret, user_id, role, ttl_hours)
        }
    }
}

/// Loads the full configuration and installs the subscriber for its log format.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::from_env()?;

    // Setup logging
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    Ok(config)
}

async fn serve(config: Config, with_worker: bool) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let expense_repo = Arc::new(PostgresExpenseRepository::new(pool.clone()));
    let approval_repo = Arc::new(PostgresApprovalRepository::new(pool.clone()));
    let lifecycle = ExpenseLifecycle::new(expense_repo, approval_repo);

    let payment_client =
        PaymentClient::new(config.payment_api_url.clone(), config.payment_timeout());
    tracing::info!(
        "Payment client initialized with URL: {}",
        config.payment_api_url
    );

    let cancel = CancellationToken::new();
    let worker_handle = if with_worker {
        let worker = SettlementWorker::new(
            lifecycle.expenses(),
            Arc::new(payment_client.clone()),
            config.worker_interval(),
        );
        let token = cancel.clone();
        Some(tokio::spawn(async move { worker.run(token).await }))
    } else {
        None
    };

    let app_state = AppState {
        expenses: lifecycle,
        auth: JwtConfig::new(config.jwt_secret.as_bytes()),
        health: HealthCheckers {
            postgres: Arc::new(PostgresChecker::new(pool.clone())),
            payment_gateway: Arc::new(PaymentGatewayChecker::new(payment_client)),
        },
        start_time: Instant::now(),
    };

    let app = create_app(app_state).layer(cors_layer(&config.allowed_origins()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!("Settlement worker task failed: {}", e);
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    let worker = SettlementWorker::new(
        Arc::new(PostgresExpenseRepository::new(pool)),
        Arc::new(PaymentClient::new(
            config.payment_api_url.clone(),
            config.payment_timeout(),
        )),
        config.worker_interval(),
    );

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { worker.run(token).await });

    shutdown_signal().await;
    cancel.cancel();
    handle.await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
