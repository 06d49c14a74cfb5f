use crate::dispatcher::{Delivery, Forwarder};
use crate::errors::ForwardError;
use crate::http::{send_checked, validate_url};
use crate::template::{TemplateValue, render};
use async_trait::async_trait;
use reqwest::Client;

const LOG_PATH: &str = "/apps/phonetrack/log/gpslogger/{token}/{name}?lat={latitude}&lon={longitude}&alt={altitude}&acc={accuracy}&speed={speed}&bearing={course}&timestamp={fixTime}";

/// Divisor applied to the record speed (knots) before it is sent
const SPEED_DIVISOR: f64 = 1.944;

/// Logs positions to a Nextcloud PhoneTrack session.
///
/// The attribute value is `token[/name]`; the name defaults to the device name.
pub struct PhoneTrackForwarder {
    client: Client,
    host: String,
}

impl PhoneTrackForwarder {
    pub fn new(client: Client, host: &str) -> Self {
        Self {
            client,
            host: host.trim().trim_end_matches('/').to_string(),
        }
    }
}

/// Session tokens are exactly 32 hexadecimal digits
pub fn is_valid_token(token: &str) -> bool {
    token.len() == 32 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[async_trait]
impl Forwarder for PhoneTrackForwarder {
    fn name(&self) -> &'static str {
        "phonetrack"
    }

    async fn forward(&self, delivery: &Delivery<'_>, value: &str) -> Result<(), ForwardError> {
        let mut parts = value.trim().split('/');
        let token = parts.next().unwrap_or_default();
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or(delivery.record.name.as_str());

        if !is_valid_token(token) {
            return Err(ForwardError::ConfigurationMismatch(format!(
                "invalid PhoneTrack token: {token}"
            )));
        }

        let mut values = delivery.record.template_values();
        values.insert("token", TemplateValue::Str(token.to_string()));
        values.insert("name", TemplateValue::Str(name.to_string()));
        if let Some(speed) = delivery.record.speed {
            values.insert("speed", TemplateValue::Float(speed / SPEED_DIVISOR));
        }

        let path = render(LOG_PATH, &values)?;
        let url = validate_url(&format!("{}{}", self.host, path))?;

        send_checked(self.client.get(url.clone()), &url).await?;
        Ok(())
    }
}
