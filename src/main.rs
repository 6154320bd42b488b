use rmcp::{ServiceExt, transport::stdio};

use asistente::config::Config;
use asistente::server::AsistenteServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Load .env from the binary's directory (MCP servers may start with any CWD).
    // Falls back to dotenvy's default CWD search if the binary path can't be resolved.
    match std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|p| p.exists())
    {
        Some(env_path) => {
            dotenvy::from_path(&env_path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing::info!("asistente starting");

    let config = Config::load()?;
    let server = AsistenteServer::new(config);
    let dispatcher = server.dispatcher();

    // Warm the model in the background so the MCP handshake isn't blocked.
    let warm = dispatcher.clone();
    tokio::spawn(async move {
        if let Err(e) = warm.initialize().await {
            tracing::warn!("backend warm-up failed, will retry on first chat: {e}");
        }
    });

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    dispatcher.release().await;
    tracing::info!("asistente shutting down");
    Ok(())
}
