// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane session: dial loop, reconnect, acquire polling.
//!
//! One task owns the whole session lifecycle, so only one reconnect can
//! ever be in flight. The update stream doubles as the liveness signal
//! for the connection: when it ends and the daemon is not closing, the
//! loop dials again. A reconnect does not cancel a running job.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::daemon::{acquire_job, DaemonInner, Session};

/// First retry delay after a failed dial.
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
/// Ceiling for the dial backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Run the session until the daemon closes.
pub(crate) async fn session_loop(inner: Arc<DaemonInner>) {
    loop {
        let Some(session) = connect(&inner).await else {
            return;
        };
        *inner.session.lock() = Some(Arc::clone(&session));
        debug!("connected");

        let poll = inner.opts.poll_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = inner.closed.cancelled() => return,
                _ = session.updates.closed() => {
                    debug!("update stream ended");
                    break;
                }
                _ = ticker.tick() => acquire_job(&inner, &session).await,
            }
        }
    }
}

/// Dial until a session is established or the daemon closes.
///
/// Exponential backoff keeps a control-plane outage from being hammered
/// with dial attempts.
async fn connect(inner: &Arc<DaemonInner>) -> Option<Arc<Session>> {
    let mut delay = INITIAL_BACKOFF;
    loop {
        tokio::select! {
            _ = inner.closed.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(MAX_BACKOFF);

        let client = tokio::select! {
            _ = inner.closed.cancelled() => return None,
            result = inner.dialer.dial() => match result {
                Ok(client) => client,
                Err(error) => {
                    warn!(%error, "failed to dial");
                    continue;
                }
            },
        };
        let updates = tokio::select! {
            _ = inner.closed.cancelled() => return None,
            result = client.update_job() => match result {
                Ok(updates) => updates,
                Err(error) => {
                    warn!(%error, "create update job stream");
                    continue;
                }
            },
        };
        return Some(Arc::new(Session { client, updates }));
    }
}
