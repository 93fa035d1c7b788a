//! The streaming chat endpoint.
//!
//! One JSON object per `data:` line, closed by a `[DONE]` sentinel — the
//! framing the frontend has always consumed.

use crate::api::models::ChatRequestBody;
use crate::supervisor::AgentService;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{stream, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;

pub async fn stream_chat(
    State(service): State<Arc<AgentService>>,
    Json(body): Json<ChatRequestBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = body.into_turn_request();
    info!(
        thread_id = %request.thread_id,
        resume = request.resume.is_some(),
        "chat turn started"
    );

    let lines = service.handle_turn(request);
    let stream = lines
        .map(|line| Ok(Event::default().data(line)))
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
