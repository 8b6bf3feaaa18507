use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Passwordless Azure SQL access with short-lived identity tokens
#[derive(Parser)]
#[command(name = "tokenbridge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to bind (defaults to PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Acquire an access token and print its unverified claims
    Token {
        /// Token audience (defaults to SQL_TOKEN_SCOPE)
        #[arg(long)]
        scope: Option<String>,
    },

    /// Print the unverified claims of the federated workload token
    DecodeFederationToken {
        /// Token file (defaults to AZURE_FEDERATED_TOKEN_FILE)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["tokenbridge"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["tokenbridge", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9000) })));

        let cli = Cli::try_parse_from(["tokenbridge", "decode-federation-token", "--path", "/tmp/t"]).unwrap();
        match cli.command {
            Some(Commands::DecodeFederationToken { path }) => {
                assert_eq!(path, Some(PathBuf::from("/tmp/t")))
            }
            _ => panic!("expected decode-federation-token"),
        }
    }
}
