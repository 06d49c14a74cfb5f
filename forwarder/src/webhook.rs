use crate::dispatcher::{Delivery, Forwarder};
use crate::errors::ForwardError;
use crate::http::{send_checked, validate_url};
use crate::template::render;
use async_trait::async_trait;
use reqwest::Client;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookMethod {
    /// GET the rendered URL
    Get,
    /// POST to the rendered URL with an empty body
    Post,
    /// POST the original event as JSON to the rendered URL
    Json,
}

/// Calls an operator-supplied URL template, one of
/// `{name}`, `{latitude}`, `{fixTime}`, ... being substituted from the position record.
pub struct WebhookForwarder {
    client: Client,
    method: WebhookMethod,
}

impl WebhookForwarder {
    pub fn new(client: Client, method: WebhookMethod) -> Self {
        Self { client, method }
    }
}

#[async_trait]
impl Forwarder for WebhookForwarder {
    fn name(&self) -> &'static str {
        match self.method {
            WebhookMethod::Get => "webhook_get",
            WebhookMethod::Post => "webhook_post",
            WebhookMethod::Json => "webhook_json",
        }
    }

    async fn forward(&self, delivery: &Delivery<'_>, value: &str) -> Result<(), ForwardError> {
        let rendered = render(value.trim(), &delivery.record.template_values())?;
        let url = validate_url(&rendered)?;

        let request = match self.method {
            WebhookMethod::Get => self.client.get(url.clone()),
            WebhookMethod::Post => self.client.post(url.clone()),
            WebhookMethod::Json => self.client.post(url.clone()).json(delivery.event.raw()),
        };

        send_checked(request, &url).await?;
        Ok(())
    }
}
