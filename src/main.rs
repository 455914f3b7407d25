use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel::{SecurityConfig, SecurityManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = SecurityConfig::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let manager = SecurityManager::new(config)?;
    if let Err(e) = manager.start().await {
        tracing::error!("❌ Failed to start security core: {}", e);
        return Err(e.into());
    }

    let status = manager.get_status().await;
    tracing::info!(
        active_key = ?status.encryption.active_key_id,
        users = status.auth.total_users,
        policy = %status.access.policy,
        "✅ All systems operational"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    manager.stop().await?;
    Ok(())
}
