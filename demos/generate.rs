//! Generate an image and save it next to the working directory.
//!
//! Reads `BFL_API_KEY` (or `FLUX_API_KEY`), optional `FLUX_MODEL` and
//! `FLUX_BASE_URL`. Pass a prompt and, optionally, an input image path.
//! Ctrl-C cancels the running job.
//!
//! ```sh
//! BFL_API_KEY=... RUST_LOG=flux_task=debug cargo run --example generate -- "a koi pond" input.png
//! ```

use anyhow::Context;
use async_trait::async_trait;
use flux_task::{
    fetch_image, Completion, FluxError, GenerateInput, ImageConsumer, ImageLocator, Orchestrator,
    Settings,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

struct SaveToFile {
    http: reqwest::Client,
    path: PathBuf,
}

#[async_trait]
impl ImageConsumer for SaveToFile {
    async fn accept(&self, locator: &ImageLocator) -> flux_task::Result<()> {
        let bytes = fetch_image(&self.http, locator, None).await?;
        tokio::fs::write(&self.path, &bytes)
            .await
            .map_err(|e| FluxError::Delivery(format!("{}: {}", self.path.display(), e)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let prompt = args.next().context("usage: generate <prompt> [input-image]")?;
    let image = match args.next() {
        Some(path) => Some(std::fs::read(&path).with_context(|| format!("failed to read {}", path))?),
        None => None,
    };

    let http = reqwest::Client::new();
    let consumer = SaveToFile {
        http: http.clone(),
        path: PathBuf::from("flux-output.png"),
    };
    let orchestrator = Orchestrator::new(Settings::from_env(), consumer).with_http_client(http);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let mut input = GenerateInput::new(prompt);
    input.image = image;

    let result = orchestrator
        .generate(input, |p| match p.percent {
            Some(pct) => println!("[{}] {} ({:.0}%)", p.stage, p.message, pct),
            None => println!("[{}] {}", p.stage, p.message),
        })
        .await;

    match result {
        Ok(Completion::Ready(_)) => println!("Saved {}", orchestrator.consumer().path.display()),
        Ok(Completion::Cancelled) => println!("Cancelled"),
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }
    Ok(())
}
