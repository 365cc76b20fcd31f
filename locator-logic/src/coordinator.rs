use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, info, warn};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};

use crate::{
    error::{LocationError, LocationResult},
    location::Fix,
    service::{FixSink, LocationService, SessionEvent, SessionRx, SessionTx},
    settings::LocatorSettings,
};

type RequestId = u64;

struct PendingRequest {
    id: RequestId,
    /// Used to abort the request from outside (cancel, disable)
    events: SessionTx,
}

enum RequestState {
    Idle,
    Requesting(PendingRequest),
}

struct CoordinatorState {
    settings: LocatorSettings,
    request: RequestState,
    next_id: RequestId,
    last_fix: Option<(Fix, Instant)>,
}

impl CoordinatorState {
    /// The last fix, only if it's within the configured max age
    fn fresh_fix(&self) -> Option<Fix> {
        let max_age = self.settings.max_fix_age()?;
        self.last_fix
            .as_ref()
            .filter(|(_, received)| received.elapsed() <= max_age)
            .map(|(fix, _)| fix.clone())
    }

    /// Push an abort into the outstanding request, returns whether there was one
    fn abort(&self, reason: LocationError) -> bool {
        match &self.request {
            RequestState::Requesting(pending) => {
                debug!("Aborting request #{} ({reason})", pending.id);
                pending.events.send(SessionEvent::Aborted(reason)).is_ok()
            }
            RequestState::Idle => false,
        }
    }
}

/// Resets the coordinator to idle and stops the platform session when the request ends, even if
/// the awaiting future is dropped early.
struct ActiveRequest<'a, L: LocationService> {
    coordinator: &'a Coordinator<L>,
    id: RequestId,
    fix: Option<Fix>,
}

impl<L: LocationService> Drop for ActiveRequest<'_, L> {
    fn drop(&mut self) {
        self.coordinator.finish_request(self.id, self.fix.take());
    }
}

enum Begin<'a, L: LocationService> {
    Cached(Fix),
    Started(ActiveRequest<'a, L>, SessionRx),
}

/// Requests single fixes from a [LocationService], at most one at a time, each bounded by a
/// timeout. Every accepted request resolves exactly once, whichever of the platform reply, the
/// timer, or a cancellation comes first.
pub struct Coordinator<L: LocationService> {
    service: L,
    state: Mutex<CoordinatorState>,
}

impl<L: LocationService> Coordinator<L> {
    pub fn new(service: L, settings: LocatorSettings) -> Self {
        Self {
            service,
            state: Mutex::new(CoordinatorState {
                settings,
                request: RequestState::Idle,
                next_id: 0,
                last_fix: None,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enabled(&self) -> bool {
        self.lock_state().settings.enabled
    }

    /// Turn requests on or off, turning off resolves any outstanding request with
    /// [LocationError::Disabled]
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.lock_state();
        state.settings.enabled = enabled;
        if !enabled {
            state.abort(LocationError::Disabled);
        }
    }

    /// Default timeout used by [Self::request_location]
    pub fn timeout(&self) -> Duration {
        self.lock_state().settings.timeout()
    }

    pub fn set_timeout(&self, timeout: Duration) -> Result<(), LocationError> {
        if timeout.is_zero() {
            return Err(LocationError::InvalidTimeout);
        }
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self.lock_state().settings.timeout_millis = millis;
        Ok(())
    }

    pub fn settings(&self) -> LocatorSettings {
        self.lock_state().settings.clone()
    }

    pub fn is_requesting(&self) -> bool {
        matches!(self.lock_state().request, RequestState::Requesting(_))
    }

    /// The most recent successful fix, if any
    pub fn last_fix(&self) -> Option<Fix> {
        self.lock_state().last_fix.as_ref().map(|(fix, _)| fix.clone())
    }

    /// Resolve the outstanding request with [LocationError::Cancelled].
    /// Returns false if nothing was outstanding.
    pub fn cancel(&self) -> bool {
        self.lock_state().abort(LocationError::Cancelled)
    }

    fn begin(&self, timeout: Duration) -> Result<Begin<'_, L>, LocationError> {
        let mut state = self.lock_state();

        if !state.settings.enabled {
            debug!("Rejecting location request, coordinator is disabled");
            return Err(LocationError::Disabled);
        }

        if timeout.is_zero() {
            return Err(LocationError::InvalidTimeout);
        }

        if let RequestState::Requesting(pending) = &state.request {
            debug!("Rejecting location request, #{} is in progress", pending.id);
            return Err(LocationError::Busy);
        }

        if let Some(fix) = state.fresh_fix() {
            debug!("Reusing cached fix at {}", fix.coordinate);
            return Ok(Begin::Cached(fix));
        }

        let id = state.next_id;
        state.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        state.request = RequestState::Requesting(PendingRequest {
            id,
            events: tx.clone(),
        });

        drop(state);

        // Guard is live before the platform is touched
        let active = ActiveRequest {
            coordinator: self,
            id,
            fix: None,
        };

        debug!("Starting location request #{id} with timeout {timeout:?}");
        self.service.start_single_fix_session(FixSink::new(tx));

        Ok(Begin::Started(active, rx))
    }

    fn finish_request(&self, id: RequestId, fix: Option<Fix>) {
        let mut state = self.lock_state();

        let current = matches!(&state.request, RequestState::Requesting(pending) if pending.id == id);
        if !current {
            return;
        }

        state.request = RequestState::Idle;

        if let Some(fix) = fix {
            state.last_fix = Some((fix, Instant::now()));
        }

        debug!("Location request #{id} finished");
        self.service.stop_session();
    }

    /// Request the current location using the configured default timeout
    pub async fn request_location(&self) -> LocationResult {
        let timeout = self.timeout();
        self.request_location_with_timeout(timeout).await
    }

    /// Request the current location, failing with [LocationError::Timeout] if the platform
    /// hasn't produced a fix within `timeout`
    pub async fn request_location_with_timeout(&self, timeout: Duration) -> LocationResult {
        let (mut active, mut events) = match self.begin(timeout)? {
            Begin::Cached(fix) => return Ok(fix),
            Begin::Started(active, events) => (active, events),
        };

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let res = loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(SessionEvent::Update(fix)) => {
                        if fix.coordinate.is_valid() {
                            break Ok(fix);
                        }
                        warn!("Ignoring invalid fix from platform: {:?}", fix.coordinate);
                    }
                    Some(SessionEvent::Error(err) | SessionEvent::Aborted(err)) => break Err(err),
                    // The pending request holds a sender, shouldn't happen
                    None => break Err(LocationError::ServiceUnavailable),
                },

                _ = &mut deadline => {
                    break Err(LocationError::Timeout);
                }
            }
        };

        // Resolved, nothing sent from here on is accepted (including cancel)
        events.close();

        match &res {
            Ok(fix) => {
                info!("Location request #{} resolved at {}", active.id, fix.coordinate);
                active.fix = Some(fix.clone());
            }
            Err(why) => info!("Location request #{} failed: {why}", active.id),
        }

        // Stop the session and go idle before handing the result back
        drop(active);
        drop(events);

        res
    }

    /// Callback flavor of [Self::request_location_with_timeout], `callback` is called exactly
    /// once from a spawned task, even when the request is rejected outright.
    /// `None` uses the configured default timeout.
    pub fn request_location_then<F>(
        self: &Arc<Self>,
        timeout: Option<Duration>,
        callback: F,
    ) -> JoinHandle<()>
    where
        L: 'static,
        F: FnOnce(LocationResult) + Send + 'static,
    {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let res = match timeout {
                Some(timeout) => coordinator.request_location_with_timeout(timeout).await,
                None => coordinator.request_location().await,
            };
            callback(res);
        })
    }
}
