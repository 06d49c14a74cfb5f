pub mod aprs;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod http;
pub mod metrics_defs;
pub mod phonetrack;
pub mod template;
pub mod webdav;
pub mod webhook;

#[cfg(test)]
mod testutils;

use crate::aprs::AprsForwarder;
use crate::config::Config;
use crate::dispatcher::{DestinationKind, DispatchReport, Dispatcher, KeywordMatcher};
use crate::errors::{EventError, ForwarderError, Result};
use crate::event::InboundEvent;
use crate::metrics_defs::EVENTS_RECEIVED;
use crate::phonetrack::PhoneTrackForwarder;
use crate::webdav::WebDavForwarder;
use crate::webhook::{WebhookForwarder, WebhookMethod};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::admin_service::AdminService;
use shared::counter;
use shared::http::{make_error_response, make_text_response, run_http_service};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Wires one forwarder per destination kind. PhoneTrack and APRS-local are
/// only registered when their host is configured.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let matcher = KeywordMatcher::new(config.keywords.prioritized());
    if matcher.is_empty() {
        tracing::warn!("No destination keywords configured, events will be accepted and dropped");
    }

    let client = http::build_client(config.timeouts.http_timeout_secs)
        .map_err(|e| ForwarderError::InternalError(format!("failed to build HTTP client: {e}")))?;
    let aprs_timeout = Duration::from_secs(config.timeouts.aprs_timeout_secs);

    let mut dispatcher = Dispatcher::new(matcher)
        .with_forwarder(
            DestinationKind::Json,
            Arc::new(WebhookForwarder::new(client.clone(), WebhookMethod::Json)),
        )
        .with_forwarder(
            DestinationKind::Get,
            Arc::new(WebhookForwarder::new(client.clone(), WebhookMethod::Get)),
        )
        .with_forwarder(
            DestinationKind::Post,
            Arc::new(WebhookForwarder::new(client.clone(), WebhookMethod::Post)),
        )
        .with_forwarder(
            DestinationKind::WebDav,
            Arc::new(WebDavForwarder::new(client.clone())),
        )
        .with_forwarder(
            DestinationKind::Aprs,
            Arc::new(AprsForwarder::new(
                DestinationKind::Aprs,
                config.aprs.clone(),
                aprs_timeout,
            )),
        );

    if let Some(host) = &config.phonetrack_host {
        dispatcher = dispatcher.with_forwarder(
            DestinationKind::PhoneTrack,
            Arc::new(PhoneTrackForwarder::new(client.clone(), host)),
        );
    }

    if let Some(server) = &config.aprs_local {
        dispatcher = dispatcher.with_forwarder(
            DestinationKind::AprsLocal,
            Arc::new(AprsForwarder::new(
                DestinationKind::AprsLocal,
                server.clone(),
                aprs_timeout,
            )),
        );
    }

    Ok(dispatcher)
}

/// Runs the event listener, and the admin listener when configured, until
/// either fails.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let dispatcher = Arc::new(build_dispatcher(&config)?);
    let forwarder_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        ForwarderService::new(dispatcher),
    );

    match &config.admin_listener {
        Some(admin) => {
            let admin_service = AdminService::<_, ForwarderError>::new(|| true);
            let admin_task = run_http_service(&admin.host, admin.port, admin_service);
            tokio::try_join!(forwarder_task, admin_task)?;
        }
        None => forwarder_task.await?,
    }

    Ok(())
}

/// Dispatches a single event body without opening a listener
pub async fn replay(config: &Config, data: &str) -> Result<DispatchReport> {
    config.validate()?;
    let dispatcher = build_dispatcher(config)?;
    Ok(dispatcher.process_data(data).await)
}

/// Accepts Traccar event posts on any path. The event is acknowledged as
/// soon as it parses; delivery happens on a spawned task.
pub struct ForwarderService {
    dispatcher: Arc<Dispatcher>,
}

impl ForwarderService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    async fn handle<B>(
        dispatcher: Arc<Dispatcher>,
        request: Request<B>,
    ) -> Response<BoxBody<Bytes, ForwarderError>>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Display,
    {
        let path = request.uri().path().to_string();

        if request.method() != Method::POST {
            tracing::debug!(method = %request.method(), %path, "Rejecting non-POST request");
            return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        let body = match request.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::warn!(%path, error = %err, "Failed to read request body");
                return make_error_response(StatusCode::BAD_REQUEST);
            }
        };
        tracing::debug!(%path, body = %String::from_utf8_lossy(&body), "POST request");

        let event = match serde_json::from_slice(&body)
            .map_err(EventError::from)
            .and_then(InboundEvent::from_value)
        {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(%path, error = %err, "Dropping unparsable event");
                counter!(EVENTS_RECEIVED, "outcome" => "invalid_json").increment(1);
                return make_error_response(StatusCode::BAD_REQUEST);
            }
        };

        tokio::spawn(async move {
            let report = dispatcher.dispatch(&event).await;
            tracing::debug!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Event dispatched"
            );
        });

        make_text_response(StatusCode::OK, format!("POST request for {path}"))
    }
}

impl Service<Request<Incoming>> for ForwarderService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = ForwarderError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move { Ok(Self::handle(dispatcher, req).await) })
    }
}
