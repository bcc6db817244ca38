//! Command-line interface for the Dataplug server

use clap::Parser;
use std::path::PathBuf;

/// Dataplug - WhatsApp chat-commerce backend
#[derive(Debug, Parser)]
#[command(name = "dataplug", version, about)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "DATAPLUG_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path to the SQLite database
    #[arg(long, env = "DATAPLUG_DB_PATH", default_value = "dataplug.db")]
    pub db_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["dataplug"]);
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.db_path, PathBuf::from("dataplug.db"));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from(["dataplug", "--port", "9000", "--db-path", "/tmp/d.db"]);
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.db_path, PathBuf::from("/tmp/d.db"));
    }
}
