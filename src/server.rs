//! HTTP server exposing the adapters under `/api/v1`.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/v1/chat/completions` | OpenAI chat (JSON or SSE) |
//! | `POST /api/v1/embeddings` | OpenAI embeddings |
//! | `POST /api/v1/embed` | TEI embeddings |
//!
//! Every request owns a cancellation token that fires when the handler future
//! or the SSE body is dropped, so a client disconnect aborts backend calls.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::{stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::api::openai::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::api::tei::{self, EmbedRequest};
use crate::api::ApiError;
use crate::broker::Broker;
use crate::drivers::FragmentStream;
use crate::embeddings::EmbeddingRequest;
use crate::types::ResponseFragment;
use crate::Result;

pub struct AppState {
    pub broker: Broker,
}

pub fn router(broker: Broker) -> Router {
    let state = Arc::new(AppState { broker });

    let api = Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/embeddings", post(embeddings))
        .route("/embed", post(embed));

    Router::new().nest("/api/v1", api).with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, broker: Broker, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(broker))
        .with_graceful_shutdown(shutdown)
        .await
}

fn rejected(rejection: JsonRejection) -> Response {
    ApiError::invalid_request(rejection.body_text()).into_response()
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejected(rejection),
    };
    let streaming = payload.stream;
    let (request, options) = match payload.into_canonical() {
        Ok(v) => v,
        Err(e) => return ApiError::from(e).into_response(),
    };
    debug!(model = %request.model, streaming, tools = request.tools.len(), "chat completion request");

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    if streaming {
        let mut fragments = state.broker.run_streaming_inference(cancel, request, options);
        // Failures before the first fragment are reported as a plain JSON error.
        let first = match fragments.next().await {
            Some(Err(e)) => return ApiError::from(e).into_response(),
            other => other,
        };
        return sse_response(first, fragments, guard);
    }

    let selection = request.tool_selection;
    let result = state.broker.run_inference(&cancel, request, options).await;
    drop(guard);
    match result {
        Ok(response) => Json(ChatCompletionResponse::from_inference(&response, selection)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Render fragments as `chat.completion.chunk` events terminated by
/// `data: [DONE]`. An error ends the stream with a single `data: {error}` event.
fn sse_response(
    first: Option<Result<ResponseFragment>>,
    rest: FragmentStream,
    guard: DropGuard,
) -> Response {
    // The guard lives as long as the body; dropping the body cancels the request.
    let fragments = stream::iter(first).chain(rest).map(move |item| {
        let _alive = &guard;
        item
    });

    let events = stream::unfold((Box::pin(fragments), false), |(mut fragments, ended)| async move {
        if ended {
            return None;
        }
        let event = match fragments.next().await {
            Some(Ok(fragment)) => {
                let event = Event::default().json_data(ChatCompletionChunk::from_fragment(&fragment));
                return Some((event, (fragments, false)));
            }
            Some(Err(e)) => Event::default().json_data(ApiError::from(e)),
            None => Ok(Event::default().data("[DONE]")),
        };
        Some((event, (fragments, true)))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn embeddings(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejected(rejection),
    };
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    match state.broker.create_embeddings(&cancel, request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn embed(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<EmbedRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejected(rejection),
    };
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    match state.broker.create_embeddings(&cancel, request.into_canonical()).await {
        Ok(response) => Json(tei::embed_response(response)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
