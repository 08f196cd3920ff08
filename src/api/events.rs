//! Server-Sent Events stream of history changes

use std::collections::HashSet;
use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::services::{EventKind, HistoryEvent};
use crate::utils::AppError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamParams {
    /// Comma-separated event kinds; all kinds when absent
    #[serde(default)]
    pub types: Option<String>,
}

fn parse_kinds(types: Option<&str>) -> Result<Option<HashSet<EventKind>>, AppError> {
    let Some(types) = types.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    types
        .split(',')
        .map(|t| t.trim().parse::<EventKind>().map_err(AppError::bad_request))
        .collect::<Result<HashSet<_>, _>>()
        .map(Some)
}

fn to_sse_event(event: &HistoryEvent) -> Option<Event> {
    match Event::default().event(event.kind().as_str()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::error!("Failed to encode history event: {}", e);
            None
        }
    }
}

/// Stream `nouvelleEntree`, `nettoyage` and `historiqueVide` events
pub async fn history_event_stream(
    State(state): State<AppState>,
    Query(params): Query<EventStreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let kinds = parse_kinds(params.types.as_deref())?;
    let receiver = state.history.events();

    use futures::StreamExt as FuturesStreamExt;

    let stream = FuturesStreamExt::filter_map(BroadcastStream::new(receiver), move |result| {
        let wanted = match (&result, &kinds) {
            (Ok(event), Some(kinds)) => kinds.contains(&event.kind()),
            _ => true,
        };
        Box::pin(async move {
            match result {
                Ok(event) if wanted => to_sse_event(&event).map(Ok::<_, Infallible>),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("History event subscriber lagging: {}", e);
                    None
                }
            }
        })
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
