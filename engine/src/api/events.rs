//! Server-sent event feed of turn records.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};

use crate::AppState;

/// GET /events: `{"type":"connected"}` first, then one record per turn.
///
/// The subscription is dropped, and so unregistered, when the client goes away.
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.bus.subscribe();
    tracing::debug!(subscriber = subscription.id(), "event stream opened");

    let connected = stream::once(async {
        Ok::<_, Infallible>(Event::default().data(r#"{"type":"connected"}"#))
    });
    let records = stream::unfold(subscription, |mut subscription| async move {
        let message = subscription.recv().await?;
        Some((
            Ok::<_, Infallible>(Event::default().data(&*message)),
            subscription,
        ))
    });

    Sse::new(connected.chain(records)).keep_alive(
        KeepAlive::new()
            .interval(state.sse_keepalive)
            .text("keep-alive"),
    )
}
