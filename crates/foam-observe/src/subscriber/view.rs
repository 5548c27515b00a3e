use foam_model::{PushEvent, RunState};
use tracing::{debug, info, trace, warn};

#[inline]
pub fn message_for(event: &PushEvent) -> &'static str {
    match event {
        PushEvent::Output(_) => "output line",
        PushEvent::Completion(c) => match c.state {
            RunState::Completed => "run completed",
            RunState::Stopped => "run stopped",
            _ => "run failed",
        },
        PushEvent::Connection(_) => "push channel opened",
        PushEvent::Lagged { .. } => "subscriber lagged; events dropped",
    }
}

/// Mirror one push event into the service log.
#[inline]
pub fn log_event(event: &PushEvent) {
    let msg = message_for(event);

    match event {
        PushEvent::Output(line) => trace!(
            target: "foam.observe.journal",
            run_id = %line.run_id,
            stream = line.stream.as_str(),
            text = %line.text,
            "{msg}"
        ),
        PushEvent::Completion(c) if c.state == RunState::Failed => warn!(
            target: "foam.observe.journal",
            run_id = %c.run_id,
            exit_code = c.exit_code,
            duration_secs = c.duration,
            error = c.error.as_deref().unwrap_or(""),
            "{msg}"
        ),
        PushEvent::Completion(c) => info!(
            target: "foam.observe.journal",
            run_id = %c.run_id,
            exit_code = c.exit_code,
            duration_secs = c.duration,
            "{msg}"
        ),
        PushEvent::Connection(conn) => debug!(
            target: "foam.observe.journal",
            session = %conn.session_id,
            kind = conn.kind.as_str(),
            "{msg}"
        ),
        PushEvent::Lagged { skipped } => {
            warn!(target: "foam.observe.journal", skipped, "{msg}")
        }
    }
}
