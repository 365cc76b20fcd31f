use clap::{Parser, Subcommand, ValueEnum};
use interprocess::local_socket::{tokio::Stream, traits::tokio::Stream as _};
use locator_logic::{Coordinate, Fix, LocationError, format_coordinate};
use locator_test_shared::{
    DEFAULT_SOCKET, PlatformScript, TestingRequest, TestingResponse, encode_line, get_socket_name,
    prelude::*,
};
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
struct Cli {
    /// Name of the local socket the test daemon is listening on
    #[arg(long, default_value = DEFAULT_SOCKET)]
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ErrorValue {
    PermissionDenied,
    ServiceUnavailable,
}

impl From<ErrorValue> for LocationError {
    fn from(value: ErrorValue) -> Self {
        match value {
            ErrorValue::PermissionDenied => LocationError::PermissionDenied,
            ErrorValue::ServiceUnavailable => LocationError::ServiceUnavailable,
        }
    }
}

#[derive(Subcommand)]
enum ScriptCommand {
    /// Platform never answers
    Silent,
    /// Platform answers with a fix
    Fix {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        long: f64,
        /// Delay before answering
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Platform answers with an error
    Fail {
        #[arg(value_enum)]
        error: ErrorValue,
        /// Delay before answering
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
}

impl From<ScriptCommand> for PlatformScript {
    fn from(value: ScriptCommand) -> Self {
        match value {
            ScriptCommand::Silent => PlatformScript::Silent,
            ScriptCommand::Fix {
                lat,
                long,
                delay_ms,
            } => PlatformScript::FixAfter {
                delay_millis: delay_ms,
                coordinate: Coordinate::new(lat, long),
            },
            ScriptCommand::Fail { error, delay_ms } => PlatformScript::FailAfter {
                delay_millis: delay_ms,
                error: error.into(),
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Request the current location and wait for the result
    Locate {
        /// Override the configured timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Cancel the outstanding request
    Cancel,
    /// Allow location requests
    Enable,
    /// Reject location requests, resolves any outstanding one
    Disable,
    /// Change the default timeout
    SetTimeout { millis: u64 },
    /// Change how the fake platform answers the next session
    #[command(subcommand)]
    Script(ScriptCommand),
    /// Print the current settings
    Settings,
    /// Print the last successful fix
    LastFix,
}

impl From<Commands> for TestingRequest {
    fn from(value: Commands) -> Self {
        match value {
            Commands::Locate { timeout_ms } => TestingRequest::Locate {
                timeout_millis: timeout_ms,
            },
            Commands::Cancel => TestingRequest::Cancel,
            Commands::Enable => TestingRequest::SetEnabled(true),
            Commands::Disable => TestingRequest::SetEnabled(false),
            Commands::SetTimeout { millis } => TestingRequest::SetTimeout(millis),
            Commands::Script(script) => TestingRequest::Script(script.into()),
            Commands::Settings => TestingRequest::GetSettings,
            Commands::LastFix => TestingRequest::LastFix,
        }
    }
}

fn describe_fix(fix: &Fix) -> String {
    let mut out = format_coordinate(fix.coordinate);
    if let Some(altitude) = fix.altitude {
        out.push_str(&format!(" alt {altitude:.1}m"));
    }
    if let Some(accuracy) = fix.accuracy {
        out.push_str(&format!(" ±{accuracy:.1}m"));
    }
    if let Some(speed) = fix.speed {
        out.push_str(&format!(" {speed:.1}m/s"));
    }
    out.push_str(&format!(" at {}", fix.timestamp.to_rfc3339()));
    out
}

fn print_response(resp: TestingResponse) -> Result {
    match resp {
        TestingResponse::Complete => println!("Ok"),
        TestingResponse::Located(Ok(fix)) => println!("{}", describe_fix(&fix)),
        TestingResponse::Located(Err(why)) => bail!("Location request failed: {why}"),
        TestingResponse::Settings(settings) => println!(
            "enabled: {}, timeout: {}ms, max fix age: {}",
            settings.enabled,
            settings.timeout_millis,
            settings
                .max_fix_age_millis
                .map(|age| format!("{age}ms"))
                .unwrap_or_else(|| "none".to_string())
        ),
        TestingResponse::LastFix(Some(fix)) => println!("{}", describe_fix(&fix)),
        TestingResponse::LastFix(None) => println!("No fix yet"),
        TestingResponse::Cancelled(true) => println!("Cancelled"),
        TestingResponse::Cancelled(false) => println!("Nothing to cancel"),
        TestingResponse::Error(why) => bail!("Daemon error: {why}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();

    let socket_name = get_socket_name(cli.socket.clone()).context("Failed to get socket name")?;

    let stream = Stream::connect(socket_name)
        .await
        .context("Failed to connect to socket")?;
    let (recv, mut send) = stream.split();

    let req = TestingRequest::from(cli.command);
    debug!("Sending {req:?}");
    send.write_all(&encode_line(&req)?)
        .await
        .context("Failed to send request")?;

    let mut recv = BufReader::new(recv);
    let mut line = String::with_capacity(256);
    let read = recv
        .read_line(&mut line)
        .await
        .context("Failed to read response")?;
    if read == 0 {
        bail!("Daemon closed the connection without responding");
    }

    let resp = serde_json::from_str::<TestingResponse>(&line).context("Failed to parse response")?;
    print_response(resp)
}
