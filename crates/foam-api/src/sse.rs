use std::{
    convert::Infallible,
    time::{Duration, SystemTime},
};

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use foam_core::Subscription;
use foam_model::{ConnectionEvent, ConnectionKind, PushEvent, RunId};
use futures::{Stream, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reconnect delay suggested to clients.
pub(crate) const RETRY_HINT: Duration = Duration::from_secs(3);

const KEEP_ALIVE_EVERY: Duration = Duration::from_secs(15);

/// Greeting for a new push session. A `Last-Event-ID` makes it a reconnect.
pub(crate) fn greeting(previous: Option<String>, active_run: Option<RunId>) -> ConnectionEvent {
    let kind = if previous.is_some() {
        ConnectionKind::Reconnected
    } else {
        ConnectionKind::Connected
    };
    ConnectionEvent {
        kind,
        session_id: uuid::Uuid::new_v4().to_string(),
        previous_session: previous,
        active_run,
        server_time: SystemTime::now(),
    }
}

/// One SSE frame per push event; the SSE event name is the wire event name.
pub(crate) fn render(event: &PushEvent) -> Event {
    let frame = Event::default().event(event.name());
    let built = match event {
        PushEvent::Output(line) => frame.json_data(line),
        PushEvent::Completion(done) => frame.json_data(done),
        PushEvent::Connection(conn) => frame
            .id(conn.session_id.as_str())
            .retry(RETRY_HINT)
            .json_data(conn),
        PushEvent::Lagged { skipped } => {
            frame.json_data(serde_json::json!({ "skipped": skipped }))
        }
    };
    built.unwrap_or_else(|e| {
        warn!(target: "foam.api.sse", event = event.name(), error = %e, "event not encodable");
        Event::default().comment("dropped unencodable event")
    })
}

/// Greeting first, then every event of `sub` until the broadcaster closes or `shutdown` fires.
pub(crate) fn push_stream(
    hello: ConnectionEvent,
    sub: Subscription,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(
        (Some(hello), sub, shutdown),
        |(hello, mut sub, shutdown)| async move {
            if let Some(hello) = hello {
                debug!(target: "foam.api.sse", session = %hello.session_id, kind = hello.kind.as_str(), "push session opened");
                let frame = render(&PushEvent::Connection(hello));
                return Some((Ok(frame), (None, sub, shutdown)));
            }
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                event = sub.recv() => event,
            };
            let event = next?;
            Some((Ok(render(&event)), (None, sub, shutdown)))
        },
    )
}

pub(crate) fn into_sse<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_EVERY))
}
