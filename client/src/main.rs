use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pfurl_shared::response::render;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod archive;
mod config;
mod copy;
mod encoder;
mod exchange;
mod session;
mod shutdown;

use config::{FileConfig, Settings};
use session::Session;

#[derive(Parser, Debug)]
#[command(name = "pfurl")]
#[command(version)]
#[command(about = "Process-File-over-URL: send JSON actions and filesystem paths to a remote service", long_about = None)]
pub struct Cli {
    /// Message to send to pman or similar listener
    #[arg(long, value_name = "JSONpayload")]
    pub msg: Option<String>,

    /// The REST verb to use for the remote service
    #[arg(long, value_name = "RESTVERB")]
    pub verb: Option<String>,

    /// The address of the remote service
    #[arg(long, value_name = "http://<IP>[:<port>]</some/path/>")]
    pub http: Option<String>,

    /// Route the request through an http proxy
    #[arg(long = "httpProxy", value_name = "[http://]<IP>[:<port>]")]
    pub http_proxy: Option<String>,

    /// A user name and password authentication string
    #[arg(long, value_name = "<user>:<passwd>")]
    pub auth: Option<String>,

    /// A token to transmit for authentication with an http request
    #[arg(long = "authToken", value_name = "token")]
    pub auth_token: Option<String>,

    /// An optional outer wrapper for the JSON payload
    #[arg(long = "jsonwrapper", value_name = "outerMsgJSONwrapper")]
    pub json_wrapper: Option<String>,

    /// Only echo the final payload returned from the remote server
    #[arg(long)]
    pub quiet: bool,

    /// Do not parse the return data from the remote call as JSON
    #[arg(long, conflicts_with = "http_response_body_parse")]
    pub raw: bool,

    /// Transmit a shutdown control sequence to the remote server after communicating
    #[arg(long = "oneShot")]
    pub one_shot: bool,

    /// Content-Type of the outgoing message
    #[arg(long = "content-type", value_name = "type")]
    pub content_type: Option<String>,

    /// Pretty-print the returned JSON payload with this indent
    #[arg(long = "jsonpprintindent", value_name = "indent", allow_negative_numbers = true)]
    pub json_pprint_indent: Option<i64>,

    /// Interpret the return payload as encapsulated in an http response
    #[arg(long = "httpResponseBodyParse")]
    pub http_response_body_parse: bool,

    /// Allow https requests to servers with self-signed certificates
    #[arg(long = "unverifiedCerts")]
    pub unverified_certs: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Configuration file (default: pfurl.yml in the current or home directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbosity level: 0 warnings only, 1 progress, 2 and up debug
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    pub verbosity: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbosity);

    let file = match cli.config.clone().or_else(FileConfig::find_config) {
        Some(path) => {
            debug!("Using config file {}", path.display());
            FileConfig::load(&path)?
        }
        None => FileConfig::default(),
    };

    let settings = Settings::resolve(&cli, file)?;
    let indent = settings.indent;

    let outcome = match Session::new(settings).run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(status) = e.status() {
                debug!("Remote answered with HTTP {}", status);
            }
            return Err(e.into());
        }
    };
    if let Some(warning) = &outcome.shutdown_warning {
        warn!("Primary exchange succeeded; {}", warning);
    }

    let rendered = render(&outcome.result, indent)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&rendered).context("Failed to write result")?;
    if !rendered.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;

    Ok(())
}

/// Logs go to stderr; stdout carries only the result
fn init_logging(quiet: bool, verbosity: u8) {
    let level = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pfurl={},pfurl_shared={}", level, level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
