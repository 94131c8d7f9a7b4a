use clap::{Parser, Subcommand};
use data_encoding::HEXLOWER_PERMISSIVE;
use std::str::FromStr;

/// Owner key hash given on the command line as hex text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerKeyArg(Vec<u8>);

impl OwnerKeyArg {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl FromStr for OwnerKeyArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER_PERMISSIVE
            .decode(s.as_bytes())
            .map_err(|e| format!("Invalid owner key: {s} ({e}). Expected hex text"))?;
        if bytes.is_empty() {
            return Err("Owner key must not be empty".to_string());
        }
        Ok(OwnerKeyArg(bytes))
    }
}

impl std::fmt::Display for OwnerKeyArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", data_encoding::HEXLOWER.encode(&self.0))
    }
}

#[derive(Debug, Parser)]
#[command(name = "powchain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new blockchain")]
    Createblockchain {
        #[arg(help = "Hex key hash to send the genesis reward to")]
        owner: OwnerKeyArg,
    },
    #[command(name = "getbalance", about = "Get the balance of a key hash")]
    GetBalance {
        #[arg(help = "Hex key hash")]
        owner: OwnerKeyArg,
    },
    #[command(
        name = "send",
        about = "Send value between key hashes and mine it into a block"
    )]
    Send {
        #[arg(help = "Source key hash, also receives the block reward")]
        from: OwnerKeyArg,
        #[arg(help = "Destination key hash")]
        to: OwnerKeyArg,
        #[arg(help = "Amount to send")]
        amount: u64,
    },
    #[command(name = "mine", about = "Mine a block containing only the coinbase")]
    Mine {
        #[arg(help = "Hex key hash to send the block reward to")]
        owner: OwnerKeyArg,
    },
    #[command(name = "printchain", about = "Print all blocks in the blockchain")]
    Printchain,
    #[command(name = "reindexutxo", about = "Rebuild UTXO index set")]
    Reindexutxo,
    #[command(name = "validatechain", about = "Check proof of work and links of every block")]
    Validatechain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_key_parsing() {
        let key: OwnerKeyArg = "00ABff".parse().unwrap();
        assert_eq!(key.as_bytes(), &[0x00, 0xAB, 0xFF]);
        assert_eq!(key.to_string(), "00abff");

        assert!("xyz".parse::<OwnerKeyArg>().is_err());
        assert!("abc".parse::<OwnerKeyArg>().is_err());
        assert!("".parse::<OwnerKeyArg>().is_err());
    }

    #[test]
    fn test_send_arguments() {
        let opt = Opt::try_parse_from(["powchain", "send", "aa", "bb", "42"]).unwrap();
        match opt.command {
            Command::Send { from, to, amount } => {
                assert_eq!(from.as_bytes(), &[0xAA]);
                assert_eq!(to.as_bytes(), &[0xBB]);
                assert_eq!(amount, 42);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Opt::try_parse_from(["powchain", "send", "aa", "bb", "-1"]).is_err());
    }
}
