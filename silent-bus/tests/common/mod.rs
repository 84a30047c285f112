//! A local stand-in for the BusNearby endpoints.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::json;

use silent_bus::busnearby::{BusNearbyClient, BusNearbyConfig, RetryPolicy};

/// Request counters per endpoint.
#[derive(Default)]
pub struct Hits {
    pub search: AtomicU32,
    pub stop_times: AtomicU32,
    pub plan: AtomicU32,
}

impl Hits {
    pub fn search(&self) -> u32 {
        self.search.load(Ordering::SeqCst)
    }

    pub fn stop_times(&self) -> u32 {
        self.stop_times.load(Ordering::SeqCst)
    }

    pub fn plan(&self) -> u32 {
        self.plan.load(Ordering::SeqCst)
    }
}

pub struct Stub {
    pub addr: SocketAddr,
    pub hits: Arc<Hits>,
}

impl Stub {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A client pointed at this stub that retries twice with no delay.
    pub fn client(&self) -> BusNearbyClient {
        let config = BusNearbyConfig::default()
            .with_base_url(self.base_url())
            .with_search_url(format!("{}/stopSearch", self.base_url()))
            .with_timeout(1)
            .with_retry(RetryPolicy::new(Duration::ZERO, 2));
        BusNearbyClient::new(config).unwrap()
    }
}

/// Serve the stub on an ephemeral port.
///
/// Stations: 24068 (bus stop with lines 249, 40, 605), 3600 and 2300
/// (rail). Stop 500 answers HTTP 500, 999 answers garbage and 777 is too
/// slow to answer within the client timeout. Anything else is a 404.
pub async fn spawn() -> Stub {
    let hits = Arc::new(Hits::default());

    let app = Router::new()
        .route("/stopSearch", get(search))
        .route("/directions/index/stops/:stop/stoptimes", get(stop_times))
        .route("/directions/index/plan", get(plan))
        .with_state(Arc::clone(&hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Stub { addr, hits }
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn search(
    State(hits): State<Arc<Hits>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    hits.search.fetch_add(1, Ordering::SeqCst);

    let query = params.get("query").map(String::as_str).unwrap_or_default();
    let body = match query {
        "24068" | "Central" => json!([
            {"stop_id": 24068, "name": "Central Station", "city": "Tel Aviv", "lat": 32.05, "lon": 34.78}
        ]),
        "3600" => json!([{"stop_id": "3600", "name": "Tel Aviv Savidor"}]),
        "2300" => json!([{"stop_id": "2300", "name": "Haifa Center"}]),
        _ => json!([]),
    };
    Json(body)
}

async fn stop_times(State(hits): State<Arc<Hits>>, Path(stop): Path<String>) -> Response {
    hits.stop_times.fetch_add(1, Ordering::SeqCst);

    let service_day = Utc::now().timestamp();
    match stop.as_str() {
        "1:24068" => Json(json!({
            "times": [
                {"routeShortName": "249", "serviceDay": service_day, "realtimeArrival": 750, "realtime": true, "headsign": "Central"},
                {"routeShortName": "40", "serviceDay": service_day, "scheduledArrival": 330, "tripHeadsign": "Airport"},
                {"routeShortName": "605", "serviceDay": service_day, "realtimeArrival": 1230, "realtime": true},
                {"routeShortName": "249", "serviceDay": service_day, "realtimeArrival": 1830, "realtime": true, "headsign": "Central"}
            ]
        }))
        .into_response(),
        "1:3600" | "1:2300" => Json(json!({"times": []})).into_response(),
        "1:500" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "1:999" => "<html>maintenance</html>".into_response(),
        "1:777" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"times": []})).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn plan(State(hits): State<Arc<Hits>>) -> Json<serde_json::Value> {
    hits.plan.fetch_add(1, Ordering::SeqCst);

    let now_ms = Utc::now().timestamp_millis();
    Json(json!({
        "plan": {
            "itineraries": [
                {
                    "startTime": now_ms + 1_530_000,
                    "duration": 3300,
                    "realtime": true,
                    "legs": [
                        {"mode": "WALK", "to": {"name": "Platform 2"}},
                        {"mode": "RAIL", "to": {"name": "Haifa Center"}}
                    ]
                },
                {
                    "startTime": now_ms + 330_000,
                    "duration": 3600,
                    "legs": [{"mode": "RAIL", "to": {"name": "Haifa Center"}}]
                }
            ]
        }
    }))
}
