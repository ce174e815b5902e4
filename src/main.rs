use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;
use wishwall::app::Args;

const LOG_ENV: &str = "WISHWALL_LOG";

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => return,
        Err(err) => {
            eprintln!("error: {err:#}\n\nRun with --help for usage.");
            std::process::exit(2);
        }
    };

    init_logging();

    if let Err(err) = wishwall::run(args) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns `None` when a flag such as `--version` was handled and the
/// program should exit.
fn parse_args<I>(raw: I) -> Result<Option<Args>>
where
    I: IntoIterator<Item = String>,
{
    let mut args = Args::default();
    let mut raw = raw.into_iter();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("wishwall {}", wishwall::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!(
                    "wishwall {} - a message wall with threaded comments.\n\n\
                     Usage: wishwall [OPTIONS] [POST_ID]\n\n\
                     Lists the wall, or prints the comment thread of POST_ID.\n\n  \
                     --config PATH            Read configuration from PATH\n  \
                     --demo                   Use built-in sample data instead of the backend\n  \
                     --sort MODE              latest, oldest or popular\n  \
                     --set-backend URL KEY    Save the backend url and api key, then exit\n  \
                     --version, -V            Show version and exit\n  \
                     --help,    -h            Show this help message\n\n\
                     Set {LOG_ENV}=debug for diagnostics.",
                    wishwall::VERSION
                );
                return Ok(None);
            }
            "--demo" => args.demo = true,
            "--config" => {
                let path = raw.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--sort" => {
                let mode = raw.next().context("--sort needs a mode")?;
                args.sort = Some(mode.parse()?);
            }
            "--set-backend" => {
                let url = raw.next().context("--set-backend needs a url and an api key")?;
                let key = raw.next().context("--set-backend needs an api key")?;
                args.set_backend = Some((url, key));
            }
            flag if flag.starts_with('-') => bail!("unknown flag {flag}"),
            post_id => {
                if args.post_id.is_some() {
                    bail!("only one post id may be given");
                }
                args.post_id = Some(post_id.to_string());
            }
        }
    }
    Ok(Some(args))
}
