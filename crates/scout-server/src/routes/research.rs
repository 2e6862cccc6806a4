use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use scout::{
    events::{AgentEvent, EventSink},
    pipeline::{ModelSelection, Pipeline},
    providers::factory,
    wikipedia::WikipediaToolkit,
};
use serde::Deserialize;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchRequest {
    question: String,
    supervisor_model: String,
    researcher_model: String,
    synthesizer_model: String,
}

/// Server-sent events response: one `data:` frame per pipeline event, in
/// strict emission order; the stream ends when the run closes its channel
pub struct SseResponse {
    rx: ReceiverStream<AgentEvent>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<AgentEvent>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx).map(|opt| {
            opt.map(|event| {
                let payload =
                    serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                Ok(Bytes::from(format!("data: {}\n\n", payload)))
            })
        })
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }
}

async fn research_handler(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Result<SseResponse, StatusCode> {
    let provider = factory::get_provider(state.provider_config).map_err(|e| {
        tracing::error!(error = %e, "failed to build provider");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let toolkit = WikipediaToolkit::new().map_err(|e| {
        tracing::error!(error = %e, "failed to build knowledge toolkit");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let models = ModelSelection {
        supervisor: request.supervisor_model,
        researcher: request.researcher_model,
        synthesizer: request.synthesizer_model,
    };
    let pipeline = Pipeline::new(provider, Box::new(toolkit), models);

    // One channel per run. Dropping the response (client disconnect) closes
    // the receiving end; the pipeline observes that at its next emit and
    // stops without producing further events.
    let (tx, rx) = mpsc::channel(100);
    let sink = EventSink::new(tx);

    tokio::spawn(async move {
        pipeline.run(&request.question, &sink).await;
        // sink drops here, which closes the stream exactly once, after
        // either pipeline-done or error
    });

    Ok(SseResponse::new(ReceiverStream::new(rx)))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/research", post(research_handler))
        .with_state(state)
}
