use clap::Parser;
use ghimg::{Application, Config, shutdown_signal, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // reqwest is built without a default provider
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = ghimg::config::Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!(
            "Configuration is valid: uploads go to {}/{} ({} on {}).",
            config.github.owner, config.github.repository, config.github.folder, config.github.branch
        );
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;
    tracing::debug!("{:?}", args);

    if config.github.token.is_none() {
        tracing::warn!("No GitHub token configured (set GITHUB_TOKEN); uploads to private or protected repositories will fail");
    }

    Application::new(config)?.serve(shutdown_signal()).await
}
