use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc;

use crate::{error::LocationError, location::Fix};

#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    /// Platform produced a reading
    Update(Fix),
    /// Platform failed
    Error(LocationError),
    /// The coordinator itself ended the request (cancel, disable)
    Aborted(LocationError),
}

pub(crate) type SessionTx = mpsc::UnboundedSender<SessionEvent>;
pub(crate) type SessionRx = mpsc::UnboundedReceiver<SessionEvent>;

/// Handle given to a [LocationService] for reporting the outcome of a single-fix session.
/// Can be cloned and sent across threads freely. Anything reported after the owning request
/// has resolved is dropped.
#[derive(Debug, Clone)]
pub struct FixSink(SessionTx);

impl FixSink {
    pub(crate) fn new(tx: SessionTx) -> Self {
        Self(tx)
    }

    /// Report a reading
    pub fn update(&self, fix: Fix) {
        if self.0.send(SessionEvent::Update(fix)).is_err() {
            debug!("Ignoring fix for a request that already resolved");
        }
    }

    /// Report a failure
    pub fn error(&self, err: LocationError) {
        if self.0.send(SessionEvent::Error(err)).is_err() {
            debug!("Ignoring error ({err}) for a request that already resolved");
        }
    }

    /// Whether the request this sink reports to has already resolved
    pub fn is_resolved(&self) -> bool {
        self.0.is_closed()
    }
}

/// Platform location provider, produces single fixes on demand.
///
/// `stop_session` is called with the coordinator's state locked, implementations must not call
/// back into the [crate::Coordinator] from it. Reporting through the [FixSink] is fine anywhere.
pub trait LocationService: Send + Sync {
    /// Begin a session that should produce one fix (or error) through `sink`
    fn start_single_fix_session(&self, sink: FixSink);
    /// End the current session, any further reports are ignored
    fn stop_session(&self);
}

impl<T: LocationService + ?Sized> LocationService for Arc<T> {
    fn start_single_fix_session(&self, sink: FixSink) {
        (**self).start_single_fix_session(sink)
    }

    fn stop_session(&self) {
        (**self).stop_session()
    }
}
