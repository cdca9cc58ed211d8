// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod console;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use console::ConsoleBot;
use skriv_bootstrap::App;
use skriv_chat::IncomingMessage;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match skriv_config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration load failed: {e:#}");
            return ExitCode::from(2);
        }
    };

    let mode_override = match cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml_string(&config));
            return ExitCode::SUCCESS;
        }
        Some(Commands::CheckConfig) => {
            return match config.validate() {
                Ok(()) => {
                    println!("configuration is valid");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("configuration is invalid: {e:#}");
                    ExitCode::from(2)
                }
            };
        }
        Some(Commands::Run { mode }) => mode,
        None => None,
    };

    let mut config = config;
    if let Some(mode) = mode_override {
        config.agent.default_mode = mode;
    }
    if let Err(e) = config.validate() {
        error!("configuration is invalid: {e:#}");
        return ExitCode::from(2);
    }
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: skriv_config::Config) -> anyhow::Result<()> {
    let app = App::build(
        config,
        Arc::new(ConsoleBot::default()),
        Arc::new(skriv_model::MockProvider),
    )
    .await?;

    info!("reading messages from stdin: `<user_id> <text>` per line");
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin);

    use tokio::io::AsyncBufReadExt;
    let mut line = String::new();
    let mut message_id = 0i64;
    loop {
        line.clear();
        let read = tokio::select! {
            n = lines.read_line(&mut line) => n?,
            _ = tokio::signal::ctrl_c() => 0,
        };
        if read == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((user, text)) = trimmed.split_once(' ') else {
            eprintln!("expected `<user_id> <text>`");
            continue;
        };
        let Ok(user_id) = user.parse::<i64>() else {
            eprintln!("bad user id: {user}");
            continue;
        };
        // Console counterparts of the chat front-end's mode commands.
        match text.trim() {
            "/note" => app.set_mode(user_id, skriv_config::Mode::Note).await,
            "/ask" => app.set_mode(user_id, skriv_config::Mode::Ask).await,
            "/agent" => app.set_mode(user_id, skriv_config::Mode::Agent).await,
            "/flush" => app.flush_user(user_id).await,
            text => {
                message_id += 1;
                app.handle_message(IncomingMessage::text_only(
                    user_id, user_id, message_id, text,
                ))
                .await;
            }
        }
    }

    app.shutdown().await;
    Ok(())
}

fn serde_yaml_string(config: &skriv_config::Config) -> String {
    serde_yaml::to_string(config).unwrap_or_default()
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,skriv=debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
