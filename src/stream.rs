use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::Event;
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use tokio::time::Instant;
use tracing::debug;

use crate::liveness::LivenessTracker;
use crate::store::TailCursor;

/// One frame of the tail stream, before SSE encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    SourceUp,
    SourceDown,
    Line(String),
    Ping(i64),
}

/// Per-session follow loop over the log file and the source liveness
/// flag.
///
/// Each iteration checks for a liveness transition first, then drains one
/// available log line, then falls back to a keep-alive ping once the ping
/// interval has elapsed. When nothing is ready the loop sleeps one poll
/// interval; that sleep is the only suspension point, so a liveness flip
/// is noticed within a poll interval even with no lines flowing.
pub struct TailFollower {
    cursor: TailCursor,
    liveness: Arc<LivenessTracker>,
    /// Last alive flag announced to this client; `None` until the source
    /// state is determinate, so a session never opens with a spurious
    /// `source_down`.
    announced: Option<bool>,
    last_ping: Option<Instant>,
    ping_interval: Duration,
    poll_interval: Duration,
}

impl TailFollower {
    pub fn new(
        cursor: TailCursor,
        liveness: Arc<LivenessTracker>,
        ping_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            cursor,
            liveness,
            announced: None,
            last_ping: None,
            ping_interval,
            poll_interval,
        }
    }

    /// Produces the next event for this session, pending until one is
    /// due. The session ends by dropping the follower, not by this
    /// returning.
    pub async fn next_event(&mut self) -> TailEvent {
        loop {
            // Source state first, so a stalled source is reported even
            // while no lines are flowing.
            if self.liveness.has_seen() {
                let alive = self.liveness.is_alive(Utc::now());
                if self.announced != Some(alive) {
                    self.announced = Some(alive);
                    return if alive {
                        TailEvent::SourceUp
                    } else {
                        TailEvent::SourceDown
                    };
                }
            }

            match self.cursor.read_next() {
                Ok(Some(line)) => return TailEvent::Line(line),
                Ok(None) => {}
                Err(e) => {
                    // Transient read hiccups are retried on the next poll.
                    debug!("tail read failed, retrying: {}", e);
                }
            }

            if self.ping_due() {
                self.last_ping = Some(Instant::now());
                return TailEvent::Ping(Utc::now().timestamp());
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn ping_due(&self) -> bool {
        match self.last_ping {
            Some(at) => at.elapsed() >= self.ping_interval,
            None => true,
        }
    }
}

/// SSE stream for one tail session: a leading `retry:` directive, then
/// the follower's events encoded as SSE frames. Dropping the stream (the
/// client disconnected) releases the cursor with it.
pub fn sse_events(
    follower: TailFollower,
    retry: Duration,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    let lead = stream::once(async move { Ok(Event::default().retry(retry)) });
    let events = stream::unfold(follower, |mut follower| async move {
        let event = follower.next_event().await;
        Some((Ok(encode(event)), follower))
    });
    lead.chain(events)
}

fn encode(event: TailEvent) -> Event {
    match event {
        TailEvent::SourceUp => Event::default().event("source_up").data("1"),
        TailEvent::SourceDown => Event::default().event("source_down").data("0"),
        TailEvent::Line(line) => Event::default().data(line),
        TailEvent::Ping(ts) => Event::default().event("ping").data(ts.to_string()),
    }
}
