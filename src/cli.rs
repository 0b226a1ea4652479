use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

use crate::io::HttpOptions;

#[derive(Parser, Debug)]
#[command(name = "tiles3tz")]
#[command(version)]
#[command(about = "Create, inspect and validate 3TZ tileset archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  tiles3tz convert ./tileset out.3tz       pack a tileset directory\n  \
  tiles3tz cat out.3tz tileset.json        print the root manifest\n  \
  tiles3tz ls https://example.com/t.3tz    list keys of a remote archive\n  \
  tiles3tz validate out.3tz                check the index thoroughly")]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, value_enum, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Attempts for HTTP requests that time out or fail to connect
    #[arg(long, value_name = "N", default_value_t = 10, global = true)]
    pub retries: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List entry keys (index order for 3TZ archives)
    #[command(alias = "ls")]
    List {
        /// Archive path, directory or HTTP URL
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Only list keys matching these patterns (`*` and `?` wildcards)
        #[arg(value_name = "PATTERNS")]
        patterns: Vec<String>,
    },

    /// Write one entry to stdout
    Cat {
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Copy every entry of one archive into a new one
    Convert {
        /// Source archive or directory
        #[arg(value_name = "INPUT")]
        input: String,

        /// Target `.3tz` file or directory
        #[arg(value_name = "OUTPUT")]
        output: String,

        /// Overwrite the output if it exists
        #[arg(short, long)]
        force: bool,
    },

    /// Check the index of a 3TZ archive
    Validate {
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Skip the cross-check against the central directory
        #[arg(long)]
        quick: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Cli {
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.timeout),
            max_retry: self.retries.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_convert() {
        let cli = Cli::try_parse_from(["tiles3tz", "convert", "in", "out.3tz", "-f"]).unwrap();
        match cli.command {
            Command::Convert {
                input,
                output,
                force,
            } => {
                assert_eq!(input, "in");
                assert_eq!(output, "out.3tz");
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_http_flags() {
        let cli = Cli::try_parse_from(["tiles3tz", "ls", "a.3tz", "--timeout", "5", "--retries", "0"])
            .unwrap();
        let options = cli.http_options();
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.max_retry, 1);
    }
}
