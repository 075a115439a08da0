use std::sync::Arc;
use std::time::Duration;

use drift::app::{DriftApp, Flow, HELP_TEXT, Output};
use drift::settings::SettingsStore;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("failed to read stdin on `{stage}`: {source}"))]
    ReadStdin {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write stdout on `{stage}`: {source}"))]
    WriteStdout {
        stage: &'static str,
        source: std::io::Error,
    },
}

type AppResult<T> = Result<T, AppError>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run().await {
        tracing::error!(error = %error, "drift exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let settings = Arc::new(SettingsStore::load());
    tracing::info!(
        config_path = %settings.config_path().display(),
        has_api_key = settings.has_valid_api_key(),
        "settings loaded"
    );

    let (mut app, mut session_events) = DriftApp::new(settings);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    write_output(&mut stdout, &[Output::Line(HELP_TEXT.to_string())]).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context(ReadStdinSnafu { stage: "read-command-line" })? else {
                    tracing::info!("stdin closed");
                    break;
                };
                match app.handle_line(&line) {
                    Flow::Continue(output) => write_output(&mut stdout, &output).await?,
                    Flow::Quit => break,
                }
            }
            Some(event) = session_events.recv() => {
                let output = app.handle_session_event(event);
                write_output(&mut stdout, &output).await?;
            }
            now = ticker.tick() => {
                let delta = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;
                app.tick(delta);
            }
        }
    }

    Ok(())
}

async fn write_output(stdout: &mut tokio::io::Stdout, output: &[Output]) -> AppResult<()> {
    if output.is_empty() {
        return Ok(());
    }

    for item in output {
        let text = match item {
            Output::Line(text) => format!("{text}\n"),
            Output::Inline(text) => text.clone(),
        };
        stdout
            .write_all(text.as_bytes())
            .await
            .context(WriteStdoutSnafu {
                stage: "write-output",
            })?;
    }
    stdout.flush().await.context(WriteStdoutSnafu {
        stage: "flush-output",
    })
}
