// This is my main entry point for the ledger node CLI
// The engine only emits events; here I just pick the LogSink so they end up in the log
use clap::Parser;
use log::{error, info, LevelFilter};
use pow_ledger::{
    Blockchain, Command, LedgerNode, LogSink, Miner, Opt, Settings, GLOBAL_CONFIG,
};
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::thread;

fn main() {
    // I initialize logging at Info level; RUST_LOG still overrides it
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    // If something goes wrong, I log the error and exit with code 1
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// Settings come from the built-in defaults and environment, plus the TOML file if I passed one
fn load_settings(config: Option<&Path>) -> pow_ledger::Result<Settings> {
    match config {
        Some(path) => GLOBAL_CONFIG.load_file(path),
        None => Ok(GLOBAL_CONFIG.get_settings()),
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        // Start a node: server first, then the optional outbound peer, then mining
        Command::StartNode {
            port,
            connect,
            mine,
            config,
        } => {
            load_settings(config.as_deref())?;
            if let Some(port) = port {
                GLOBAL_CONFIG.set_node_port(port);
            }
            let settings = GLOBAL_CONFIG.get_settings();

            let node = LedgerNode::new(settings, Arc::new(LogSink))?;
            let bound = node.start_server()?;
            info!("Node listening on port {bound}");

            if let Some(peer_port) = connect {
                node.connect_to_peer(peer_port)?;
            }

            if mine {
                let handle = node.start_mining()?;
                let produced = handle
                    .join()
                    .map_err(|_| "miner thread panicked".to_string())?;
                info!(
                    "Mining finished after {produced} blocks, ledger holds {} blocks",
                    node.snapshot().len()
                );
                node.stop();
            } else {
                // Without mining I just keep serving and syncing until I'm killed
                loop {
                    thread::park();
                }
            }
        }
        // Print the effective settings so I can copy them into a config file
        Command::ShowConfig { config } => {
            let settings = load_settings(config.as_deref())?;
            print!("{}", settings.to_toml_string()?);
        }
        // Mine a ledger locally with no networking at all
        Command::Mine { blocks, difficulty } => {
            let mut settings = GLOBAL_CONFIG.get_settings();
            settings.max_chain_length = blocks;
            if let Some(difficulty) = difficulty {
                settings.default_difficulty = difficulty;
            }
            settings.validate()?;

            let blockchain = Blockchain::new(&settings);
            let miner = Miner::new(blockchain.clone(), settings, Arc::new(LogSink));
            miner.run();

            for block in blockchain.snapshot().iter() {
                println!("{block}");
                println!();
            }
        }
    }
    Ok(())
}
