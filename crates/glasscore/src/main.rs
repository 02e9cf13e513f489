// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use glasscore::config::CoreConfig;

#[derive(Parser)]
#[command(name = "glasscore", about = "Per-user glasses/app session core")]
struct Cli {
    #[command(flatten)]
    config: CoreConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.config.log_level.clone()))
        .json()
        .init();

    glasscore::run(cli.config).await
}
