pub mod client;
pub mod packet;

use crate::config::AprsServer;
use crate::dispatcher::{Delivery, DestinationKind, Forwarder};
use crate::errors::ForwardError;
use async_trait::async_trait;
use std::time::Duration;

/// Per-device APRS parameters, parsed from the attribute value
/// `callsign passcode fromcall symbols [comment...]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AprsIdentity {
    /// APRS-IS login
    pub callsign: String,
    pub passcode: String,
    /// Source of the packet, usually the callsign with an SSID
    pub fromcall: String,
    pub symbol_table: char,
    pub symbol: char,
    pub comment: String,
}

impl AprsIdentity {
    pub fn parse(value: &str) -> Result<Self, ForwardError> {
        let mut fields = value.split_whitespace();

        let (Some(callsign), Some(passcode), Some(fromcall), Some(symbols)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ForwardError::ConfigurationMismatch(
                "expected 'callsign passcode fromcall symbols [comment]'".into(),
            ));
        };

        let mut chars = symbols.chars();
        let (Some(symbol_table), Some(symbol), None) = (chars.next(), chars.next(), chars.next())
        else {
            return Err(ForwardError::ConfigurationMismatch(format!(
                "symbol must be a table and symbol character pair, got {symbols:?}"
            )));
        };

        Ok(AprsIdentity {
            callsign: callsign.to_string(),
            passcode: passcode.to_string(),
            fromcall: fromcall.to_string(),
            symbol_table,
            symbol,
            comment: fields.collect::<Vec<_>>().join(" "),
        })
    }
}

/// Sends position reports to one APRS-IS server
pub struct AprsForwarder {
    kind: DestinationKind,
    server: AprsServer,
    timeout: Duration,
}

impl AprsForwarder {
    pub fn new(kind: DestinationKind, server: AprsServer, timeout: Duration) -> Self {
        Self {
            kind,
            server,
            timeout,
        }
    }
}

#[async_trait]
impl Forwarder for AprsForwarder {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn forward(&self, delivery: &Delivery<'_>, value: &str) -> Result<(), ForwardError> {
        let identity = AprsIdentity::parse(value)?;
        let packet = packet::encode_position(&identity, delivery.record);
        tracing::debug!(
            server = %self.server.host,
            port = self.server.port,
            %packet,
            "APRS packet"
        );

        client::send_packet(
            &self.server.host,
            self.server.port,
            &identity.callsign,
            &identity.passcode,
            &packet,
            self.timeout,
        )
        .await?;

        Ok(())
    }
}
