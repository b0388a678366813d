//! SSE transport
//!
//! `GET /:model` streams that model's predictions as server-sent events,
//! `GET /health` reports the registered models and the last cycle.
//! Only compiled when the `server` feature is enabled.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{ObserverError, Result};
use crate::service::ServiceHandle;

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub kind: String,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models: Vec<ModelInfo>,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Create the router with the health and per-model stream endpoints
pub fn create_router(handle: ServiceHandle) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/:model", get(stream_model))
        .with_state(handle)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve until the task is aborted
pub async fn serve(handle: ServiceHandle, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ObserverError::Config(format!("cannot bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "SSE server listening");

    axum::serve(listener, create_router(handle))
        .await
        .map_err(|e| ObserverError::SchedulerTaskFailure {
            task: "sse_server".to_string(),
            reason: e.to_string(),
        })
}

/// GET /health - Registered models and last cycle timestamp
async fn get_health(State(handle): State<ServiceHandle>) -> impl IntoResponse {
    let models = handle
        .models()
        .iter()
        .map(|m| ModelInfo {
            name: m.name.clone(),
            kind: m.kind.to_string(),
            subscribers: m.output.subscriber_count(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        models,
        last_cycle: handle.last_cycle().await,
    })
}

/// GET /:model - Prediction stream of one model
async fn stream_model(
    Path(model): Path<String>,
    State(handle): State<ServiceHandle>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, StatusCode>
{
    let rx = handle.subscribe(&model).ok_or(StatusCode::NOT_FOUND)?;
    tracing::info!(model = %model, "SSE client connected");

    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(event) => match Event::default().json_data(&*event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode prediction");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged, events skipped");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::dispatch::PredictionBroadcaster;
    use crate::service::ModelStream;
    use crate::types::{Observation, PredictionEvent, PredictionPayload};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn observation(minute: u32) -> Observation {
        Observation {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            open: 99.0,
            high: 101.0,
            low: 98.0,
            close: 100.0,
            volume: 1.0,
            quote_asset_volume: 100.0,
            number_of_trades: 3,
            taker_buy_base_asset_volume: 0.5,
            taker_buy_quote_asset_volume: 50.0,
            open_dxy: 105.2,
            fng: 45,
            fed_rate: 5.25,
        }
    }

    async fn spawn_server() -> (SocketAddr, PredictionBroadcaster) {
        let output = PredictionBroadcaster::new(8);
        let handle = ServiceHandle::new(
            vec![ModelStream {
                name: "lgr".to_string(),
                kind: ModelKind::Logistic,
                output: output.clone(),
            }],
            Arc::new(RwLock::new(None)),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, create_router(handle)).await });

        (addr, output)
    }

    #[tokio::test]
    async fn test_health_lists_models() {
        let (addr, _output) = spawn_server().await;

        let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["models"][0]["name"], "lgr");
        assert_eq!(body["models"][0]["kind"], "logistic");
        assert!(body["last_cycle"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_model_is_404() {
        let (addr, _output) = spawn_server().await;

        let response = reqwest::get(format!("http://{}/nope", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stream_delivers_events() {
        let (addr, output) = spawn_server().await;

        let mut response = reqwest::get(format!("http://{}/lgr", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let event = PredictionEvent::new(
            &observation(58),
            &observation(59),
            PredictionPayload::Directional { p_direction: 1.0 },
        );
        assert_eq!(output.publish(Arc::new(event)), 1);

        let chunk = response.chunk().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains("\"p_direction\":1.0"));
        assert!(text.contains("\"open\":99.0"));
    }
}
