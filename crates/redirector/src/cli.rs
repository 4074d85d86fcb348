//! Command-line interface.

use std::{io::Read, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::Payload;
use serde_json::Value;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(name = "redirector")]
#[command(about = "Issue and serve tamper-proof redirect links")]
#[command(version)]
pub struct Cli {
    /// Configuration file holding keys, listen address, and base URL
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new configuration file with a fresh key, replacing any existing one
    Init,

    /// Add a new key generation and use it for new links
    Rotate,

    /// Create a redirect link from key=value arguments, or a JSON object on stdin
    Create {
        /// Payload fields: `key=value` sets a string, a bare `key` sets `true`
        fields: Vec<String>,
    },

    /// Decode a redirect link and print its payload
    Parse {
        /// Full redirect URL
        url: String,
    },

    /// Run the redirecting web server
    Serve,
}

/// Build a payload from `key=value` / `flag` arguments.
pub fn payload_from_args(fields: &[String]) -> Payload {
    fields
        .iter()
        .map(|field| match field.split_once('=') {
            Some((key, value)) => (key.to_owned(), Value::String(value.to_owned())),
            None => (field.clone(), Value::Bool(true)),
        })
        .collect()
}

/// Read a JSON object payload from `reader`.
///
/// # Errors
///
/// Returns an error if the input cannot be read or is not a JSON object.
pub fn payload_from_reader(mut reader: impl Read) -> Result<Payload> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .context("failed to read payload from stdin")?;
    serde_json::from_str(&text).context("failed to parse payload json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_create_with_global_config() {
        let cli = Cli::parse_from(["redirector", "create", "url=https://e.x", "vip", "-c", "c.json"]);
        assert_eq!(cli.config, PathBuf::from("c.json"));
        let Command::Create { fields } = cli.command else {
            panic!("expected create");
        };
        assert_eq!(fields, vec!["url=https://e.x", "vip"]);
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["redirector", "serve"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(matches!(cli.command, Command::Serve));
    }

    #[test]
    fn args_become_string_or_flag_fields() {
        let payload = payload_from_args(&[
            "url=https://example.com/?a=b".into(),
            "slug=Spring Sale".into(),
            "vip".into(),
        ]);
        assert_eq!(payload["url"], json!("https://example.com/?a=b"));
        assert_eq!(payload["slug"], json!("Spring Sale"));
        assert_eq!(payload["vip"], json!(true));
    }

    #[test]
    fn reads_json_object_from_reader() {
        let payload = payload_from_reader(&br#"{"url": "u", "n": 1}"#[..]).unwrap();
        assert_eq!(payload["n"], json!(1));
        assert!(payload_from_reader(&b"[1, 2]"[..]).is_err());
    }
}
