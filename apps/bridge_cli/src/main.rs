use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{
    fs::File,
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod platform;
mod script;

use config::load_settings;
use script::{Runner, ScriptStep};

#[derive(Parser, Debug)]
#[command(about = "Replays voice gateway events and commands through the voice bridge")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON-lines script to replay; stdin when omitted.
    #[arg(long)]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::start(settings.bridge_config()).await?;
    info!(
        user_id = settings.bot_user_id,
        node = %settings.node_label,
        "voice bridge started"
    );

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.script {
        Some(path) => Box::new(BufReader::new(File::open(path).await.with_context(|| {
            format!("failed to open script '{}'", path.display())
        })?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut lines = input.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep = match serde_json::from_str(line) {
            Ok(step) => step,
            Err(error) => {
                warn!(line = line_no, %error, "skipping unreadable script line");
                continue;
            }
        };
        println!("{}", runner.run(step).await?);
    }

    runner.shutdown().await?;
    info!("voice bridge stopped");
    Ok(())
}
