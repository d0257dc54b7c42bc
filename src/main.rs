#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cfg: otadrop::config::Config =
        otadrop::config_io::load_or_create_config("config.toml").await?;

    otadrop::config::init_tracing(&cfg);
    cfg.apply_env_overrides();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "otadrop booted");

    otadrop::app::run(cfg).await?;
    Ok(())
}
