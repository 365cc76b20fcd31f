use std::{sync::Arc, time::Duration};

use interprocess::local_socket::{
    ListenerOptions,
    tokio::{Stream, prelude::*},
    traits::tokio::Stream as _,
};
use locator_logic::{LocatorSettings, SharedCoordinator, install_shared};
use locator_test_shared::*;
use log::{error, info};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    sync::mpsc,
};

const CLI_MSG: &str = "Usage: locator-test-daemon [SOCKET_NAME] [SETTINGS_JSON]";

/// Everything a connection needs to serve requests
#[derive(Clone)]
struct DaemonState {
    coordinator: SharedCoordinator,
    platform: Arc<ScriptedLocationService>,
}

impl DaemonState {
    fn new(settings: LocatorSettings) -> Result<Self> {
        let platform = Arc::new(ScriptedLocationService::default());
        let coordinator =
            install_shared(platform.clone(), settings).context("Failed to set up coordinator")?;
        Ok(Self {
            coordinator,
            platform,
        })
    }

    /// Handle a request, every request produces exactly one response on `responses`, though
    /// [TestingRequest::Locate] produces it later
    fn process_req(&self, req: TestingRequest, responses: mpsc::Sender<TestingResponse>) {
        let resp = match req {
            TestingRequest::Locate { timeout_millis } => {
                let timeout = timeout_millis.map(Duration::from_millis);
                self.coordinator
                    .request_location_then(timeout, move |res| {
                        tokio::spawn(async move {
                            responses.send(res.into()).await.ok();
                        });
                    });
                return;
            }
            TestingRequest::Cancel => TestingResponse::Cancelled(self.coordinator.cancel()),
            TestingRequest::SetEnabled(enabled) => {
                self.coordinator.set_enabled(enabled);
                TestingResponse::Complete
            }
            TestingRequest::SetTimeout(millis) => {
                match self.coordinator.set_timeout(Duration::from_millis(millis)) {
                    Ok(_) => TestingResponse::Complete,
                    Err(why) => why.into(),
                }
            }
            TestingRequest::Script(script) => {
                self.platform.set_script(script);
                TestingResponse::Complete
            }
            TestingRequest::GetSettings => self.coordinator.settings().into(),
            TestingRequest::LastFix => TestingResponse::LastFix(self.coordinator.last_fix()),
        };

        tokio::spawn(async move {
            responses.send(resp).await.ok();
        });
    }

    async fn serve(self, stream: Stream) {
        let (recv, mut send) = stream.split();
        let mut requests = spawn_request_reader(BufReader::new(recv));
        let (resp_tx, mut resp_rx) = mpsc::channel::<TestingResponse>(40);

        loop {
            tokio::select! {
                req = requests.recv() => {
                    match req {
                        Some(Ok(req)) => self.process_req(req, resp_tx.clone()),
                        Some(Err(why)) => {
                            resp_tx.send(TestingResponse::Error(why)).await.ok();
                        }
                        None => break,
                    }
                }
                Some(resp) = resp_rx.recv() => {
                    let written = match encode_line(&resp) {
                        Ok(encoded) => send.write_all(&encoded).await.context("Failed to send"),
                        Err(why) => Err(why),
                    };
                    if let Err(why) = written {
                        error!("{why:?}");
                        break;
                    }
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> Result {
    colog::init();

    let args = std::env::args().collect::<Vec<_>>();
    if args.len() > 3 {
        bail!(CLI_MSG);
    }

    let raw_socket_name = args.get(1).cloned().unwrap_or(DEFAULT_SOCKET.to_string());
    let settings = args
        .get(2)
        .map(LocatorSettings::load)
        .transpose()?
        .unwrap_or_default();

    let socket_name = get_socket_name(raw_socket_name.clone())?;
    let opts = ListenerOptions::new().name(socket_name);
    let listener = opts.create_tokio().context("Failed to bind to socket")?;

    let state = DaemonState::new(settings)?;

    info!("Testing daemon ready on {raw_socket_name}");

    loop {
        let res = tokio::select! {
            res = listener.accept() => res,
            Ok(_) = tokio::signal::ctrl_c() => break,
        };

        match res {
            Ok(stream) => {
                tokio::spawn(state.clone().serve(stream));
            }
            Err(why) => error!("Error from connection: {why:?}"),
        }
    }

    info!("Shutting down");
    state.coordinator.cancel();

    Ok(())
}
