//! Upload local image files to a running ghimg server and print their public URLs.

use clap::Parser;
use ghimg::client::{UploadClient, UploadSession, load_item};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(version, about = "Upload images to a ghimg server")]
struct PushArgs {
    /// Base URL of the ghimg server
    #[arg(short, long, env = "GHIMG_SERVER", default_value = "http://localhost:3000")]
    server: Url,

    /// Image files to upload as one batch
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

async fn run(args: PushArgs) -> anyhow::Result<bool> {
    let client = UploadClient::new(args.server)?;
    let mut session = UploadSession::new(client.fetch_limits().await?);

    let mut items = Vec::with_capacity(args.files.len());
    for path in &args.files {
        items.push(load_item(path).await?);
    }
    session.select(items)?;

    let response = client.submit(&mut session).await?;
    for link in session.links() {
        println!("{link}");
    }
    for error in &response.errors {
        eprintln!("failed: {error}");
    }
    eprintln!("{} of {} uploaded", response.uploaded, response.total);

    Ok(response.failed == 0)
}

#[tokio::main]
async fn main() -> ExitCode {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(PushArgs::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
