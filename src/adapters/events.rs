//! Server-sent event streams over the in-process notification hub.

use {
    super::{
        api_errors::ApiError,
        extract::{Admin, Guest},
    },
    crate::{
        AppState,
        domain::{
            error::EngineError,
            id::{GuestId, RestaurantId},
            notify::{Channel, Notification},
        },
    },
    axum::{
        extract::{Path, State},
        response::sse::{Event, KeepAlive, Sse},
    },
    std::time::Duration,
    tokio_stream::{Stream, StreamExt},
};

const KEEP_ALIVE: Duration = Duration::from_secs(15);

fn to_event(notification: Notification) -> Result<Event, axum::Error> {
    Event::default()
        .event(notification.event)
        .json_data(notification.payload)
}

fn stream(
    state: &AppState,
    channel: Channel,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>> + use<>> {
    tracing::debug!(%channel, subscribers = state.hub.subscriber_count(), "event stream opened");
    Sse::new(state.hub.subscribe(channel).map(to_event))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
}

pub async fn restaurant_events(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Path(restaurant_id): Path<RestaurantId>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    actor.ensure_owns(restaurant_id)?;
    Ok(stream(&state, Channel::Restaurant(restaurant_id)))
}

pub async fn guest_events(
    State(state): State<AppState>,
    Guest(caller): Guest,
    Path(guest_id): Path<GuestId>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    if caller != guest_id {
        return Err(EngineError::Authorization("cannot subscribe to another guest".into()).into());
    }
    Ok(stream(&state, Channel::Guest(guest_id)))
}
