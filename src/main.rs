use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use website_mirror::{MirrorCommand, MirrorConfig, WebsiteMirror};

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let base = match &args.config {
        Some(path) => MirrorConfig::load(path)?,
        None => MirrorConfig::default(),
    };
    let config = args.apply_to(base);

    let mut mirror = WebsiteMirror::new(&args.url, &args.output_dir, config)?;
    let summary = mirror.mirror_website().await?;

    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    println!("✅ Website mirroring completed successfully!");
    Ok(())
}
