use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use tokio::task::yield_now;

use crate::{
    FixSink, LocationService,
    error::{LocationError, LocationResult},
    location::{Coordinate, Fix},
};

/// Platform stand-in, tests push events through whatever sink the coordinator last handed it.
/// The sink is kept around after `stop_session` so late events can be simulated.
#[derive(Default)]
pub struct MockLocationService {
    sink: Mutex<Option<FixSink>>,
    on_start: Mutex<Option<LocationResult>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    /// Stops that happened while the coordinator could still accept events for the session
    open_stops: AtomicUsize,
}

impl MockLocationService {
    /// Reply synchronously from inside the next `start_single_fix_session`
    pub fn reply_on_start(&self, res: LocationResult) {
        *self.on_start.lock().expect("Poisoned") = Some(res);
    }

    pub fn push_fix(&self, fix: Fix) {
        if let Some(sink) = self.sink.lock().expect("Poisoned").as_ref() {
            sink.update(fix);
        }
    }

    pub fn push_error(&self, err: LocationError) {
        if let Some(sink) = self.sink.lock().expect("Poisoned").as_ref() {
            sink.error(err);
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn open_stops(&self) -> usize {
        self.open_stops.load(Ordering::SeqCst)
    }
}

impl LocationService for MockLocationService {
    fn start_single_fix_session(&self, sink: FixSink) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match self.on_start.lock().expect("Poisoned").take() {
            Some(Ok(fix)) => sink.update(fix),
            Some(Err(err)) => sink.error(err),
            None => {}
        }
        *self.sink.lock().expect("Poisoned") = Some(sink);
    }

    fn stop_session(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let open = self
            .sink
            .lock()
            .expect("Poisoned")
            .as_ref()
            .is_some_and(|sink| !sink.is_resolved());
        if open {
            self.open_stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A fix in San Francisco
pub fn sf_fix() -> Fix {
    Fix::new(Coordinate::new(37.7749, -122.4194))
        .with_accuracy(5.0)
        .with_altitude(16.0)
}

/// Yield until the platform has seen at least `count` session starts
pub async fn wait_for_session(platform: &MockLocationService, count: usize) {
    while platform.starts() < count {
        yield_now().await;
    }
}
