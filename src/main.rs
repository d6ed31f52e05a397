/*
 * This file is part of hw-tagger.
 *
 * Copyright (C) 2026 hw-tagger contributors
 *
 * hw-tagger is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * hw-tagger is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with hw-tagger. If not, see <https://www.gnu.org/licenses/>.
 */

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use ht_core::{run_watchers, WatchSettings};
use ht_error::HwTaggerError;
use ht_kube::NodeLabelStore;
use ht_udev::UdevSource;
use hw_tagger::cli::{Cli, Commands, GlobalArgs, ScanArgs};
use hw_tagger::config::load_config;
use hw_tagger::logger::init_logging;
use hw_tagger::scan::scan_scopes;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Device monitors block in a read; shutdown does not wait for them
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("PANIC at {}: {}", location, message);
    }));

    let cli = Cli::parse();

    let result = match cli.command() {
        Commands::Run => {
            let target = init_logging(&cli.global.log_level);
            info!("STARTUP: hw-tagger {} starting", VERSION);
            info!("STARTUP: Logging to {}", target);
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting runtime")
                .and_then(|runtime| {
                    let result = runtime.block_on(run(&cli.global));
                    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
                    result
                })
        }
        Commands::Scan(args) => scan(&cli.global, &args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(global: &GlobalArgs) -> anyhow::Result<()> {
    let host = global
        .node_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| HwTaggerError::MissingConfig("node name (--node-name or NODE_NAME)".into()))?;
    let scopes = load_config(global.config.as_deref())
        .context("loading watch scopes")?
        .into_scopes();
    let store = NodeLabelStore::discover(global.kubeconfig.as_deref())
        .context("configuring Kubernetes client")?;

    info!("STARTUP: Node: {}", host);
    info!("STARTUP: Scopes: {}", scopes.len());
    if global.dry_run {
        info!("STARTUP: Dry run, labels are not written");
    }

    let settings = WatchSettings {
        host,
        dry_run: global.dry_run,
    };
    let watchers = run_watchers(
        scopes,
        Arc::new(UdevSource::new()),
        Arc::new(store),
        settings,
    );

    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    tokio::select! {
        result = watchers => match result {
            Ok(never) => match never {},
            Err(e) => Err(e.into()),
        },
        _ = sigint.recv() => {
            info!("Got signal SIGINT, exiting");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Got signal SIGTERM, exiting");
            Ok(())
        }
    }
}

fn scan(global: &GlobalArgs, args: &ScanArgs) -> anyhow::Result<()> {
    // stdout carries the JSON, keep logs on stderr
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(global.log_level.as_str())
        .init();

    let scopes = load_config(global.config.as_deref())
        .context("loading watch scopes")?
        .into_scopes();
    let scans = scan_scopes(&scopes, &UdevSource::new(), args.subsystem.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&scans)?);
    Ok(())
}
