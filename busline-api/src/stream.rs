use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use busline_shared::BusEvent;
use futures_util::stream::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/departures/{id}/stream", get(seat_map_stream))
}

/// GET /v1/departures/:id/stream
/// Live seat-map changes for one departure. Lagged messages are skipped;
/// clients re-read the departure to resync.
async fn seat_map_stream(
    State(state): State<AppState>,
    Path(departure_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(BusEvent::SeatMapChanged(event)) if event.departure_id == departure_id => {
                serde_json::to_string(&event)
                    .ok()
                    .map(|data| Ok(Event::default().event("seat_map").data(data)))
            }
            _ => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
