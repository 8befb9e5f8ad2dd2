use std::net::SocketAddr;
use std::sync::Arc;

use engine::collaborators::{OpenAiInference, ProcessExecutor};
use engine::orchestrator::TurnOrchestrator;
use engine::session::RunSession;
use engine::tools::ToolRegistry;
use engine::AppState;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = engine::config::Config::from_env()?;
    info!(port = config.port, "engine starting");

    let tools = Arc::new(ToolRegistry::new());
    let session = RunSession::start(&config.run_base, &tools)?;

    let executor = Arc::new(ProcessExecutor::new(&config.executor));
    let inference = Arc::new(OpenAiInference::new(config.inference.clone())?);
    info!(
        program = %config.executor.program,
        model = %config.inference.model,
        url = %config.inference.url,
        "collaborators configured"
    );

    let state = Arc::new(
        AppState::new(session, tools, executor)
            .with_panel_html(config.panel_html.clone())
            .with_sse_keepalive(config.sse_keepalive)
            .with_executor_timeout(config.turn.executor_timeout),
    );

    let orchestrator = TurnOrchestrator::new(Arc::clone(&state), inference, config.turn.clone());
    tokio::spawn(orchestrator.run());

    let app = engine::api::router(state);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("dashboard live on http://{addr}, engine paused until resumed");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
