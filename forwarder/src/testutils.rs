use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::{Value, json};
use metrics::{
    Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A Traccar event as posted by the JSON forwarder
pub fn sample_event() -> Value {
    json!({
        "position": {
            "id": 9001,
            "attributes": {
                "batteryLevel": 87.0,
                "distance": 12.3,
                "ignition": true,
                "motion": false
            },
            "deviceId": 7,
            "protocol": "osmand",
            "serverTime": "2024-03-01T09:05:08.000+00:00",
            "deviceTime": "2024-03-01T09:05:06.000+00:00",
            "fixTime": "2024-03-01T09:05:07.000+00:00",
            "outdated": false,
            "valid": true,
            "latitude": 43.5,
            "longitude": -11.25,
            "altitude": 123.4,
            "speed": 12.6,
            "course": 92.0,
            "address": null,
            "accuracy": 4.5,
            "network": null
        },
        "device": {
            "id": 7,
            "attributes": {
                "get": "http://127.0.0.1:1/track?lat={latitude}&lon={longitude}",
                "webdav2": "https://cloud.example.com/s/AbCdEf123",
                "color": "red",
                "aprs": "N0CALL 12345 N0CALL-10 /[ Traccar position"
            },
            "groupId": 0,
            "name": "Panda",
            "uniqueId": "123456",
            "status": "online",
            "lastUpdate": "2024-03-01T09:05:08.000+00:00",
            "positionId": 9001,
            "disabled": false
        }
    })
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path and query
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Local HTTP server that records every request and answers with a status
/// chosen by the test.
pub struct MockServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start(status: StatusCode) -> Self {
        Self::start_with(move |_| status).await
    }

    pub async fn start_with<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> StatusCode + Send + Sync + 'static,
    {
        Self::start_with_body(move |request| {
            let status = respond(request);
            (status, status.canonical_reason().unwrap_or_default().to_string())
        })
        .await
    }

    /// Like `start_with`, but the test also picks the response body
    pub async fn start_with_body<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);
                let recorded = recorded.clone();
                let respond = respond.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let recorded = recorded.clone();
                        let respond = respond.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes())
                                .unwrap_or_default();

                            let request = RecordedRequest {
                                method: parts.method,
                                uri: parts
                                    .uri
                                    .path_and_query()
                                    .map(|pq| pq.to_string())
                                    .unwrap_or_default(),
                                headers: parts.headers,
                                body,
                            };
                            let (status, body) = respond(&request);
                            recorded.lock().unwrap().push(request);

                            let mut response = Response::new(Full::new(Bytes::from(body)));
                            *response.status_mut() = status;
                            Ok::<_, Infallible>(response)
                        }
                    });

                    if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        eprintln!("Error serving connection: {:?}", err);
                    }
                });
            }
        });

        Self { port, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Recorder that sums counters by `name{label=value,...}`. Gauges and
/// histograms are dropped.
#[derive(Clone, Default)]
pub struct CountingRecorder {
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl CountingRecorder {
    pub fn get(&self, key: &str) -> u64 {
        self.counters.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

struct CountingHandle {
    key: String,
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl CounterFn for CountingHandle {
    fn increment(&self, value: u64) {
        *self.counters.lock().unwrap().entry(self.key.clone()).or_default() += value;
    }

    fn absolute(&self, value: u64) {
        self.counters.lock().unwrap().insert(self.key.clone(), value);
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let labels: Vec<String> = key
            .labels()
            .map(|label| format!("{}={}", label.key(), label.value()))
            .collect();
        Counter::from_arc(Arc::new(CountingHandle {
            key: format!("{}{{{}}}", key.name(), labels.join(",")),
            counters: self.counters.clone(),
        }))
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
