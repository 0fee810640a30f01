use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pow-ledger")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a ledger node")]
    StartNode {
        #[arg(long, help = "Port to listen on (overrides the configured port)")]
        port: Option<u16>,
        #[arg(long = "connect", help = "Port of a peer to connect to")]
        connect: Option<u16>,
        #[arg(long, help = "Start mining right away")]
        mine: bool,
        #[arg(long, help = "TOML file with node settings")]
        config: Option<PathBuf>,
    },
    #[command(name = "showconfig", about = "Print the effective settings as TOML")]
    ShowConfig {
        #[arg(long, help = "TOML file with node settings")]
        config: Option<PathBuf>,
    },
    #[command(name = "mine", about = "Mine a local ledger offline and print it")]
    Mine {
        #[arg(long, default_value_t = 5, help = "Number of blocks to mine")]
        blocks: usize,
        #[arg(long, help = "Difficulty of the first block")]
        difficulty: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_startnode() {
        let opt = Opt::try_parse_from([
            "pow-ledger",
            "startnode",
            "--port",
            "2001",
            "--connect",
            "2002",
            "--mine",
        ])
        .unwrap();
        match opt.command {
            Command::StartNode {
                port,
                connect,
                mine,
                config,
            } => {
                assert_eq!(port, Some(2001));
                assert_eq!(connect, Some(2002));
                assert!(mine);
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_mine_defaults() {
        let opt = Opt::try_parse_from(["pow-ledger", "mine"]).unwrap();
        assert!(matches!(
            opt.command,
            Command::Mine {
                blocks: 5,
                difficulty: None
            }
        ));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Opt::try_parse_from(["pow-ledger", "startnode", "--port", "70000"]).is_err());
    }
}
