use std::process::ExitCode;

use anyhow::Result;
use yt_fetch_lib::app::{App, OutputMode};
use yt_fetch_lib::cli::{self, Command};
use yt_fetch_lib::config::AppConfig;
use yt_fetch_lib::logging;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = cli::Cli::parse_args();
    logging::init_tracing(args.verbose);

    let mut config = AppConfig::load(args.config.as_deref())?;
    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match args.command {
        Command::Download(download) => {
            if download.proxy.is_some() {
                config.proxy = download.proxy.clone();
            }
            let mut app = App::new(config);
            if app.download(&download, mode).await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Info { url, range } => {
            App::new(config).info(&url, &range, mode).await?;
        }
        Command::History { clear } => {
            App::new(config).history(clear, mode).await?;
        }
        Command::Tools => {
            App::new(config).tools(mode)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
