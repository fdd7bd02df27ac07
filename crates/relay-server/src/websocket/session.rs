//! Connection session: join, run the three per-connection tasks, clean up.
//!
//! ```text
//!            ┌─ reader   (inbound frames → router)
//! session ───┼─ writer   (outbound queue + pings → transport)
//!            └─ watchdog (idle > timeout → close)
//! ```
//!
//! Whichever task notices a problem first calls `close` with its reason;
//! the others see the cancellation and exit. Once all three have stopped the
//! session leaves the room, closes the transport under the write deadline
//! and marks the connection `Closed`.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use relay_core::InboundFrame;

use crate::config::ConnectionLimits;
use crate::hub::Hub;
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL,
    MALFORMED_FRAMES_TOTAL,
};
use crate::router::{MessageRouter, RouteError};
use crate::transport::{Frame, FrameSink, FrameSource, TransportError};

use super::connection::{ClientConnection, CloseReason};
use super::heartbeat::{HeartbeatResult, run_heartbeat};

/// Drive one connection from join to close and return why it closed.
#[instrument(
    name = "session",
    skip_all,
    fields(
        conn_id = %connection.id,
        room_id = %connection.room_id,
        sender_id = %connection.sender_id,
    )
)]
pub async fn run_connection<Src, Snk>(
    connection: Arc<ClientConnection>,
    outbound: mpsc::Receiver<Arc<str>>,
    source: Src,
    mut sink: Snk,
    hub: Hub,
    router: Arc<MessageRouter>,
    limits: ConnectionLimits,
) -> CloseReason
where
    Src: FrameSource,
    Snk: FrameSink + 'static,
{
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);

    if let Err(e) = hub.join(Arc::clone(&connection)).await {
        warn!(error = %e, "could not join room");
        let _ = connection.close(CloseReason::HubUnavailable);
        close_transport(&mut sink, limits.write_timeout).await;
        return finish(&connection);
    }
    if !connection.activate() {
        // Closed (shutdown, most likely) while the join was in flight.
        let _ = hub.leave(&connection.id).await;
        close_transport(&mut sink, limits.write_timeout).await;
        return finish(&connection);
    }
    info!("connection opened");

    let writer = tokio::spawn(write_loop(
        Arc::clone(&connection),
        outbound,
        sink,
        limits.clone(),
    ));
    let watchdog = {
        let connection = Arc::clone(&connection);
        let (interval, timeout) = (limits.heartbeat_interval, limits.heartbeat_timeout);
        tokio::spawn(async move {
            if run_heartbeat(Arc::clone(&connection), interval, timeout).await
                == HeartbeatResult::TimedOut
            {
                warn!(idle_ms = connection.idle_for().as_millis(), "keepalive timeout");
                let _ = connection.close(CloseReason::KeepaliveTimeout);
            }
        })
    };

    let reason = read_loop(&connection, source, &router, &limits).await;
    // If nobody recorded a reason, the reader was stopped by server shutdown.
    let _ = connection.close(reason.unwrap_or(CloseReason::Shutdown));

    let sink = writer
        .await
        .inspect_err(|e| warn!(error = %e, "writer task failed"))
        .ok();
    if let Err(e) = watchdog.await {
        warn!(error = %e, "watchdog task failed");
    }
    // Membership goes first: a peer that stopped reading can hold the close.
    if let Err(e) = hub.leave(&connection.id).await {
        debug!(error = %e, "registry gone before leave");
    }
    if let Some(mut sink) = sink {
        close_transport(&mut sink, limits.write_timeout).await;
    }

    finish(&connection)
}

async fn close_transport<Snk: FrameSink>(sink: &mut Snk, deadline: Duration) {
    if time::timeout(deadline, sink.close()).await.is_err() {
        debug!(timeout_ms = deadline.as_millis(), "transport close timed out");
    }
}

fn finish(connection: &ClientConnection) -> CloseReason {
    connection.mark_closed();
    let reason = connection.close_reason().unwrap_or(CloseReason::Shutdown);
    counter!(DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(reason = %reason, "connection closed");
    reason
}

/// Read until the transport ends, a fatal frame arrives or the connection is
/// cancelled. Returns `None` only when cancelled.
async fn read_loop<Src: FrameSource>(
    connection: &ClientConnection,
    mut source: Src,
    router: &MessageRouter,
    limits: &ConnectionLimits,
) -> Option<CloseReason> {
    loop {
        let next = tokio::select! {
            biased;
            () = connection.cancelled() => return None,
            next = source.recv() => next,
        };

        let frame = match next {
            None => return Some(CloseReason::ClientClosed),
            Some(Err(TransportError::TooLarge)) => return Some(CloseReason::Oversized),
            Some(Err(e)) => {
                debug!(error = %e, "read failed");
                return Some(CloseReason::ReadError);
            }
            Some(Ok(frame)) => frame,
        };
        connection.mark_activity();

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => {
                if bytes.len() > limits.max_message_size {
                    warn!(size = bytes.len(), "oversized frame");
                    return Some(CloseReason::Oversized);
                }
                if let Ok(text) = String::from_utf8(bytes) {
                    text
                } else {
                    counter!(MALFORMED_FRAMES_TOTAL).increment(1);
                    debug!("dropping non-UTF-8 binary frame");
                    continue;
                }
            }
            Frame::Ping(_) | Frame::Pong(_) => continue,
            Frame::Close => return Some(CloseReason::ClientClosed),
        };

        if text.len() > limits.max_message_size {
            warn!(size = text.len(), max = limits.max_message_size, "oversized frame");
            return Some(CloseReason::Oversized);
        }

        let inbound = match InboundFrame::parse(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                counter!(MALFORMED_FRAMES_TOTAL).increment(1);
                debug!(error = %e, "dropping malformed frame");
                continue;
            }
        };

        match router
            .route(
                &connection.id,
                &connection.room_id,
                &connection.sender_id,
                &inbound.content,
            )
            .await
        {
            Ok(_) => {}
            Err(RouteError::Hub(e)) => {
                warn!(error = %e, "registry unavailable");
                return Some(CloseReason::HubUnavailable);
            }
            Err(e) => debug!(error = %e, "message rejected"),
        }
    }
}

/// Drain the outbound queue into the transport and send pings, each write
/// under the write deadline. Hands the sink back so the session can close it.
async fn write_loop<Snk: FrameSink>(
    connection: Arc<ClientConnection>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    mut sink: Snk,
    limits: ConnectionLimits,
) -> Snk {
    let mut ping = time::interval_at(
        time::Instant::now() + limits.heartbeat_interval,
        limits.heartbeat_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            () = connection.cancelled() => break,
            _ = ping.tick() => Frame::Ping(Vec::new()),
            payload = outbound.recv() => match payload {
                Some(payload) => Frame::Text(payload.to_string()),
                None => break,
            },
        };

        match time::timeout(limits.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "write failed");
                let _ = connection.close(CloseReason::WriteError);
                break;
            }
            Err(_) => {
                warn!(timeout_ms = limits.write_timeout.as_millis(), "write timed out");
                let _ = connection.close(CloseReason::WriteTimeout);
                break;
            }
        }
    }

    outbound.close();
    sink
}
