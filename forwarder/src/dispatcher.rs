//! Attribute Dispatcher
//!
//! Scans the device attribute map of each inbound event and routes every
//! attribute whose name matches a configured keyword to the forwarder for
//! that destination kind.
//!
//! # Matching
//!
//! The attribute name is lowercased and compared against each configured
//! keyword, optionally followed by a single decimal digit, so one device can
//! carry several destinations of the same kind:
//!
//! ```text
//! keyword "webdav":  webdav, webdav0 .. webdav9   -> WebDAV
//!                    webdav10, webdavx            -> no match
//! ```
//!
//! Keywords are checked in a fixed priority order (JSON, GET, POST,
//! PhoneTrack, WebDAV, APRS, APRS-local) and the first match wins.
//!
//! # Failure isolation
//!
//! Every forwarder returns a `Result`. Failures are logged here with a level
//! that depends on the error class and never stop the remaining attributes.

use crate::errors::{EventError, ForwardError};
use crate::event::{InboundEvent, PositionRecord};
use crate::metrics_defs::{DELIVERIES, DELIVERY_DURATION, EVENTS_RECEIVED};
use async_trait::async_trait;
use serde_json::Value;
use shared::{counter, histogram};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Destination kinds, in keyword matching priority order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    Json,
    Get,
    Post,
    PhoneTrack,
    WebDav,
    Aprs,
    AprsLocal,
}

impl DestinationKind {
    pub const PRIORITY: [DestinationKind; 7] = [
        DestinationKind::Json,
        DestinationKind::Get,
        DestinationKind::Post,
        DestinationKind::PhoneTrack,
        DestinationKind::WebDav,
        DestinationKind::Aprs,
        DestinationKind::AprsLocal,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Json => "json",
            DestinationKind::Get => "get",
            DestinationKind::Post => "post",
            DestinationKind::PhoneTrack => "phonetrack",
            DestinationKind::WebDav => "webdav",
            DestinationKind::Aprs => "aprs",
            DestinationKind::AprsLocal => "aprs_local",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a forwarder needs about the event being dispatched
pub struct Delivery<'a> {
    pub event: &'a InboundEvent,
    pub record: &'a PositionRecord,
    /// Name of the matched attribute, as sent by the device
    pub attribute: &'a str,
}

/// One destination kind's encoder + transport
#[async_trait]
pub trait Forwarder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver the event to the destination described by `value`, the raw
    /// attribute value of the matched attribute.
    async fn forward(&self, delivery: &Delivery<'_>, value: &str) -> Result<(), ForwardError>;
}

/// Priority-ordered keyword table
#[derive(Clone, Debug, Default)]
pub struct KeywordMatcher {
    keywords: Vec<(DestinationKind, String)>,
}

impl KeywordMatcher {
    /// `keywords` must already be in priority order and lowercased.
    pub fn new(keywords: Vec<(DestinationKind, String)>) -> Self {
        Self { keywords }
    }

    pub fn match_attribute(&self, attribute: &str) -> Option<DestinationKind> {
        let attribute = attribute.to_lowercase();
        self.keywords
            .iter()
            .find(|(_, keyword)| keyword_matches(keyword, &attribute))
            .map(|(kind, _)| *kind)
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// `keyword` followed by at most one ASCII digit
fn keyword_matches(keyword: &str, attribute: &str) -> bool {
    match attribute.strip_prefix(keyword) {
        Some("") => true,
        Some(suffix) => suffix.len() == 1 && suffix.as_bytes()[0].is_ascii_digit(),
        None => false,
    }
}

/// Outcome of one matched attribute
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub attribute: String,
    pub kind: DestinationKind,
    pub result: Result<(), ForwardError>,
}

/// What happened to an event
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Set when the event was dropped before any delivery was attempted
    pub rejected: Option<EventError>,
    pub deliveries: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    fn rejected(err: EventError) -> Self {
        Self {
            rejected: Some(err),
            deliveries: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.deliveries.iter().filter(|d| d.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.succeeded()
    }
}

pub struct Dispatcher {
    matcher: KeywordMatcher,
    forwarders: HashMap<DestinationKind, Arc<dyn Forwarder>>,
}

impl Dispatcher {
    pub fn new(matcher: KeywordMatcher) -> Self {
        Self {
            matcher,
            forwarders: HashMap::new(),
        }
    }

    pub fn with_forwarder(mut self, kind: DestinationKind, forwarder: Arc<dyn Forwarder>) -> Self {
        self.forwarders.insert(kind, forwarder);
        self
    }

    /// Parses a raw request body and dispatches it
    pub async fn process_data(&self, data: &str) -> DispatchReport {
        match InboundEvent::parse(data) {
            Ok(event) => self.dispatch(&event).await,
            Err(err) => {
                tracing::warn!(error = %err, "Dropping unparsable event");
                counter!(EVENTS_RECEIVED, "outcome" => "invalid_json").increment(1);
                DispatchReport::rejected(err)
            }
        }
    }

    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchReport {
        if event.attributes().is_empty() {
            tracing::debug!("Event has no device attributes");
            counter!(EVENTS_RECEIVED, "outcome" => "no_attributes").increment(1);
            return DispatchReport::default();
        }

        let record = match event.position_record() {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "Dropping malformed event");
                counter!(EVENTS_RECEIVED, "outcome" => "malformed").increment(1);
                return DispatchReport::rejected(err);
            }
        };
        counter!(EVENTS_RECEIVED, "outcome" => "accepted").increment(1);

        let mut report = DispatchReport::default();

        for (attribute, value) in event.attributes() {
            let Some(kind) = self.matcher.match_attribute(attribute) else {
                continue;
            };
            tracing::debug!(attribute = %attribute, kind = %kind, device = %record.name, "Attribute matched");

            let result = match self.forwarders.get(&kind) {
                Some(forwarder) => {
                    let delivery = Delivery {
                        event,
                        record: &record,
                        attribute,
                    };
                    self.deliver(forwarder.as_ref(), kind, &delivery, value).await
                }
                None => {
                    tracing::error!(kind = %kind, "No forwarder registered for destination kind");
                    Err(ForwardError::ConfigurationMismatch(format!(
                        "no forwarder registered for {kind}"
                    )))
                }
            };

            record_outcome(kind, attribute, &result);
            report.deliveries.push(DeliveryOutcome {
                attribute: attribute.clone(),
                kind,
                result,
            });
        }

        report
    }

    async fn deliver(
        &self,
        forwarder: &dyn Forwarder,
        kind: DestinationKind,
        delivery: &Delivery<'_>,
        value: &Value,
    ) -> Result<(), ForwardError> {
        let value = match value {
            Value::String(s) => s.as_str(),
            other => {
                return Err(ForwardError::ConfigurationMismatch(format!(
                    "attribute value must be a string, got {other}"
                )));
            }
        };

        let start = Instant::now();
        let result = forwarder.forward(delivery, value).await;
        histogram!(DELIVERY_DURATION, "kind" => kind.as_str()).record(start.elapsed().as_secs_f64());

        if result.is_ok() {
            tracing::debug!(
                attribute = %delivery.attribute,
                forwarder = forwarder.name(),
                "Delivered"
            );
        }

        result
    }
}

/// Every matched attribute is counted once, whichever way it failed.
fn record_outcome(kind: DestinationKind, attribute: &str, result: &Result<(), ForwardError>) {
    let outcome = match result {
        Ok(()) => "ok",
        Err(err) => {
            log_failure(kind, attribute, err);
            err.label()
        }
    };
    counter!(DELIVERIES, "kind" => kind.as_str(), "outcome" => outcome).increment(1);
}

fn log_failure(kind: DestinationKind, attribute: &str, err: &ForwardError) {
    match err {
        // Predictable typos in device attributes
        ForwardError::ConfigurationMismatch(_) => {
            tracing::info!(kind = %kind, attribute = %attribute, error = %err, "Skipping destination")
        }
        ForwardError::InvalidUrl(_) => {
            tracing::debug!(kind = %kind, attribute = %attribute, error = %err, "Skipping destination")
        }
        ForwardError::Template(_)
        | ForwardError::Transport { .. }
        | ForwardError::UpstreamStatus { .. }
        | ForwardError::Aprs(_)
        | ForwardError::Serialization(_) => {
            tracing::error!(kind = %kind, attribute = %attribute, error = %err, "Delivery failed")
        }
    }
}
