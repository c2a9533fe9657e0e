// Copyright 2025 Shroud Labs
// Licensed under the Apache License, Version 2.0

//! Shroud Ledger Inspector
//!
//! Read-only view of a ledger database.
//!
//! ```text
//! shroud-ledger status          tree sizes, epochs and roots
//! shroud-ledger block <height>  roots and nullifiers committed by a block
//! ```

use anyhow::{Context, Result, bail};
use log::{error, info};
use std::env;
use std::process::ExitCode;

use shroud_config::ShroudConfig;
use shroud_core::{LedgerError, LedgerParams, LedgerState, RocksDbStore};

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e
                .downcast_ref::<LedgerError>()
                .map(LedgerError::is_fatal)
                .unwrap_or(false);
            if fatal {
                error!("Ledger is corrupt, refusing to continue: {}", e);
            } else {
                error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = ShroudConfig::load()?;
    let args: Vec<String> = env::args().skip(1).collect();

    info!("============================================");
    info!("        SHROUD LEDGER v{}", env!("CARGO_PKG_VERSION"));
    info!("============================================");
    info!("DB path        : {}", config.database.path);
    info!("Tree depth     : {}", config.ledger.tree_depth);
    info!("Upgrade height : {}", config.ledger.upgrade_height);
    info!(
        "Prover         : {:?}, {} workers, {} idle sets",
        config.prover.mode, config.prover.workers, config.prover.max_idle_sets
    );
    info!("============================================");

    let store = RocksDbStore::open(&config.database.path)
        .with_context(|| format!("failed to open {}", config.database.path))?;
    let ledger = LedgerState::open(store, &LedgerParams::from_config(&config))?;

    match args.first().map(String::as_str) {
        None | Some("status") => print_status(&ledger),
        Some("block") => {
            let height: u64 = args
                .get(1)
                .context("usage: shroud-ledger block <height>")?
                .parse()
                .context("height must be a number")?;
            print_block(&ledger, height)
        }
        Some(other) => bail!("unknown command {} (expected status | block <height>)", other),
    }
}

fn print_status(ledger: &LedgerState<RocksDbStore>) -> Result<()> {
    println!("working height : {}", ledger.height());
    println!("upgraded       : {}", ledger.is_upgraded());
    for status in ledger.tree_status()? {
        println!(
            "{:<6} tree    : {} leaves, epoch {}, root {}",
            format!("{:?}", status.family),
            status.size,
            status.epoch,
            hex::encode(status.root)
        );
    }
    Ok(())
}

fn print_block(ledger: &LedgerState<RocksDbStore>, height: u64) -> Result<()> {
    let Some(block) = ledger.block_record(height, None)? else {
        bail!("no block record at height {}", height);
    };
    println!("block {}", block.height);
    println!("roots ({}):", block.roots.len());
    for root in &block.roots {
        println!("  {}", hex::encode(root));
    }
    println!("nullifiers ({}):", block.nullifiers.len());
    for n in &block.nullifiers {
        println!("  {}", hex::encode(n));
    }
    Ok(())
}
