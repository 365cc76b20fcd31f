use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use interprocess::local_socket::{GenericNamespaced, Name, ToNsName};
use locator_logic::{
    Coordinate, Fix, FixSink, LocationError, LocationResult, LocationService, LocatorSettings,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

const fn default_socket() -> &'static str {
    if let Some(name) = option_env!("LOCATOR_TEST_SOCKET") {
        name
    } else {
        "locator-test.sock"
    }
}

/// Socket name used when none is given, can be baked in with `LOCATOR_TEST_SOCKET`
pub const DEFAULT_SOCKET: &str = default_socket();

pub fn get_socket_name(base_name: String) -> Result<Name<'static>> {
    base_name
        .to_ns_name::<GenericNamespaced>()
        .context("Failed to parse socket name")
}

/// Serialize a message as a single JSON line
pub fn encode_line(msg: &impl Serialize) -> Result<Vec<u8>> {
    let mut encoded = serde_json::to_vec(msg).context("Failed to encode")?;
    encoded.push(b'\n');
    Ok(encoded)
}

/// A parsed request line, or the parse error to report back
pub type IncomingRequest = Result<TestingRequest, String>;

/// Read JSON request lines on a dedicated task. Partially received lines are never lost to a
/// `select!` that happens to pick another branch. The channel closes on EOF or a read error.
pub fn spawn_request_reader<R>(reader: R) -> mpsc::Receiver<IncomingRequest>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(40);
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(why) => {
                    warn!("Read Error: {why:?}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let req = serde_json::from_str::<TestingRequest>(&line).map_err(|why| {
                warn!("Bad request {:?}: {why}", line.trim());
                why.to_string()
            });
            if tx.send(req).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// How the fake platform behaves each time a session starts
pub enum PlatformScript {
    /// Never respond
    #[default]
    Silent,
    /// Report a fix after a delay
    FixAfter {
        delay_millis: u64,
        coordinate: Coordinate,
    },
    /// Report an error after a delay
    FailAfter {
        delay_millis: u64,
        error: LocationError,
    },
}

impl PlatformScript {
    async fn play(self, sink: FixSink) {
        match self {
            Self::Silent => std::future::pending().await,
            Self::FixAfter {
                delay_millis,
                coordinate,
            } => {
                tokio::time::sleep(Duration::from_millis(delay_millis)).await;
                sink.update(Fix::new(coordinate));
            }
            Self::FailAfter {
                delay_millis,
                error,
            } => {
                tokio::time::sleep(Duration::from_millis(delay_millis)).await;
                sink.error(error);
            }
        }
    }
}

/// A [LocationService] that follows a [PlatformScript], used in place of real hardware.
/// Sessions run as tokio tasks, so it must be driven from inside a runtime.
#[derive(Default)]
pub struct ScriptedLocationService {
    script: Mutex<PlatformScript>,
    session: Mutex<Option<CancellationToken>>,
}

impl ScriptedLocationService {
    pub fn new(script: PlatformScript) -> Self {
        Self {
            script: Mutex::new(script),
            session: Mutex::new(None),
        }
    }

    /// Change the behavior for the next session, a running session keeps its old script
    pub fn set_script(&self, script: PlatformScript) {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = script;
    }

    pub fn script(&self) -> PlatformScript {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn session_active(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl LocationService for ScriptedLocationService {
    fn start_single_fix_session(&self, sink: FixSink) {
        let script = self.script();
        let cancel = CancellationToken::new();

        let previous = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        debug!("Starting scripted session: {script:?}");
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = script.play(sink) => {}
            }
        });
    }

    fn stop_session(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = session {
            debug!("Stopping scripted session");
            cancel.cancel();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TestingRequest {
    /// Request a location, `None` uses the configured timeout
    Locate { timeout_millis: Option<u64> },
    Cancel,
    SetEnabled(bool),
    SetTimeout(u64),
    Script(PlatformScript),
    GetSettings,
    LastFix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TestingResponse {
    Complete,
    Located(LocationResult),
    Settings(LocatorSettings),
    LastFix(Option<Fix>),
    Cancelled(bool),
    Error(String),
}

impl From<LocationResult> for TestingResponse {
    fn from(val: LocationResult) -> Self {
        TestingResponse::Located(val)
    }
}

impl From<LocatorSettings> for TestingResponse {
    fn from(val: LocatorSettings) -> Self {
        TestingResponse::Settings(val)
    }
}

impl From<anyhow::Error> for TestingResponse {
    fn from(value: anyhow::Error) -> Self {
        TestingResponse::Error(value.to_string())
    }
}

impl From<LocationError> for TestingResponse {
    fn from(value: LocationError) -> Self {
        TestingResponse::Error(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locator_logic::Coordinator;
    use std::sync::Arc;
    use tokio::{task::yield_now, time::Instant};

    type ScriptedCoordinator = Coordinator<Arc<ScriptedLocationService>>;

    fn mk_coordinator(script: PlatformScript) -> (Arc<ScriptedLocationService>, ScriptedCoordinator) {
        tokio::time::pause();
        let platform = Arc::new(ScriptedLocationService::new(script));
        let coordinator = Coordinator::new(platform.clone(), LocatorSettings::default());
        (platform, coordinator)
    }

    #[tokio::test]
    async fn test_scripted_fix() {
        let coordinate = Coordinate::new(37.7749, -122.4194);
        let (platform, coordinator) = mk_coordinator(PlatformScript::FixAfter {
            delay_millis: 2000,
            coordinate,
        });
        let start = Instant::now();

        let fix = coordinator
            .request_location_with_timeout(Duration::from_secs(5))
            .await
            .expect("Expected a fix");

        assert_eq!(fix.coordinate, coordinate);
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!platform.session_active());
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let (_platform, coordinator) = mk_coordinator(PlatformScript::FailAfter {
            delay_millis: 100,
            error: LocationError::ServiceUnavailable,
        });

        let res = coordinator.request_location().await;
        assert_eq!(res, Err(LocationError::ServiceUnavailable));
    }

    #[tokio::test]
    async fn test_silent_times_out_and_stops() {
        let (platform, coordinator) = mk_coordinator(PlatformScript::Silent);

        let res = coordinator
            .request_location_with_timeout(Duration::from_secs(1))
            .await;

        assert_eq!(res, Err(LocationError::Timeout));
        assert!(!platform.session_active());
    }

    #[tokio::test]
    async fn test_fix_slower_than_timeout_is_dropped() {
        let (platform, coordinator) = mk_coordinator(PlatformScript::FixAfter {
            delay_millis: 3000,
            coordinate: Coordinate::new(1.0, 1.0),
        });

        let res = coordinator
            .request_location_with_timeout(Duration::from_secs(1))
            .await;
        assert_eq!(res, Err(LocationError::Timeout));

        tokio::time::sleep(Duration::from_secs(5)).await;
        yield_now().await;
        assert_eq!(coordinator.last_fix(), None);

        platform.set_script(PlatformScript::FixAfter {
            delay_millis: 10,
            coordinate: Coordinate::new(2.0, 2.0),
        });
        let fix = coordinator.request_location().await.expect("Expected a fix");
        assert_eq!(fix.coordinate, Coordinate::new(2.0, 2.0));
    }

    #[tokio::test]
    async fn test_request_reader_keeps_split_lines() {
        use tokio::io::{AsyncWriteExt, BufReader};

        let (mut client, server) = tokio::io::duplex(64);
        let mut requests = spawn_request_reader(BufReader::new(server));

        let encoded = encode_line(&TestingRequest::SetTimeout(750)).expect("Failed to encode");
        let (head, tail) = encoded.split_at(encoded.len() / 2);

        client.write_all(head).await.expect("Failed to write");
        yield_now().await;
        assert!(requests.try_recv().is_err(), "Got a request from half a line");

        client.write_all(tail).await.expect("Failed to write");
        client.write_all(b"not json\n").await.expect("Failed to write");
        drop(client);

        let first = requests.recv().await.expect("Reader closed early");
        assert!(matches!(first, Ok(TestingRequest::SetTimeout(750))));

        let second = requests.recv().await.expect("Reader closed early");
        assert!(second.is_err());

        assert!(requests.recv().await.is_none());
    }

    #[test]
    fn test_encode_line() {
        let encoded = encode_line(&TestingRequest::Locate {
            timeout_millis: Some(500),
        })
        .expect("Failed to encode");
        assert_eq!(encoded.last(), Some(&b'\n'));

        let decoded: TestingRequest =
            serde_json::from_slice(&encoded).expect("Failed to decode");
        assert!(matches!(
            decoded,
            TestingRequest::Locate {
                timeout_millis: Some(500)
            }
        ));
    }
}
