use std::time::Duration;

use anyhow::{bail, Context};

/// Number of probe jobs run when `--jobs` is not given.
const DEFAULT_JOBS: usize = 5;

/// Parsed command-line arguments.
#[derive(Debug, PartialEq, Eq)]
pub struct CliArgs {
    /// Path to configuration file, if provided via `--config-path` or `-c`.
    pub config_path: Option<String>,
    /// Number of probe jobs to push through the queue.
    pub jobs: usize,
    /// Simulated work inside each probe job.
    pub work: Duration,
    pub help_requested: bool,
}

impl CliArgs {
    /// Parse the process arguments.
    ///
    /// Supported flags:
    /// - `--config-path <path>`, `--config-path=<path>`, `-c <path>`: Path to config file
    /// - `--jobs <n>`, `-n <n>`: Number of probe jobs
    /// - `--work-ms <ms>`: Time each probe spends working
    /// - `--help` or `-h`: Print help and exit
    pub fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        Self::parse_from(&args)
    }

    pub fn parse_from(args: &[String]) -> anyhow::Result<Self> {
        let mut parsed = Self {
            config_path: None,
            jobs: DEFAULT_JOBS,
            work: Duration::ZERO,
            help_requested: false,
        };

        let mut i = 1usize;
        while i < args.len() {
            let a = args[i].as_str();
            let (flag, inline) = match a.split_once('=') {
                Some((f, v)) if f.starts_with('-') => (f, Some(v.to_string())),
                _ => (a, None),
            };

            match flag {
                "--help" | "-h" => parsed.help_requested = true,
                "--config-path" | "-c" | "--jobs" | "-n" | "--work-ms" => {
                    let value = match inline {
                        Some(v) => v,
                        None => {
                            i += 1;
                            match args.get(i) {
                                Some(v) => v.clone(),
                                None => bail!("missing value for {flag}"),
                            }
                        }
                    };
                    match flag {
                        "--config-path" | "-c" => parsed.config_path = Some(value),
                        "--jobs" | "-n" => {
                            parsed.jobs = value
                                .parse()
                                .with_context(|| format!("invalid {flag}: {value}"))?;
                        }
                        _ => {
                            let ms: u64 = value
                                .parse()
                                .with_context(|| format!("invalid {flag}: {value}"))?;
                            parsed.work = Duration::from_millis(ms);
                        }
                    }
                }
                other => bail!("unknown argument: {other}"),
            }
            i += 1;
        }

        Ok(parsed)
    }

    /// Print usage information to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage: loved-pacer [--config-path PATH] [--jobs N] [--work-ms MS] [--help]\n\n\
             --config-path, -c    Path to configuration file (overrides LOVED_CONFIG_PATH env var)\n\
             --jobs, -n           Number of probe jobs to run (default {DEFAULT_JOBS})\n\
             --work-ms            Milliseconds each probe spends working (default 0)"
        );
    }
}
