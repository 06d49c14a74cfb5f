//! Stores each event as a JSON file on a WebDAV server.
//!
//! The attribute value is either a Nextcloud public share link
//!
//! ```text
//! https://cloud.example.com/s/AbCdEf123
//!   -> https://cloud.example.com/public.php/webdav/  user "AbCdEf123", empty password
//! ```
//!
//! or `url username [password]`. Files land in `<uniqueId>_<name>/` as
//! `YYYYMMDD_HHMMSS.json`, named after the fix time.

use crate::dispatcher::{Delivery, Forwarder};
use crate::errors::ForwardError;
use crate::event::PositionRecord;
use crate::http::{send_checked, status_error, validate_url};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use url::Url;

const SHARE_MARKER: &str = "/s/";
const PUBLIC_WEBDAV_PATH: &str = "/public.php/webdav/";

#[derive(Clone, Debug, PartialEq)]
pub struct WebDavTarget {
    /// Collection URL, always ending in '/'
    pub base: Url,
    pub username: String,
    pub password: String,
}

impl WebDavTarget {
    pub fn parse(value: &str) -> Result<Self, ForwardError> {
        let fields: Vec<&str> = value.split_whitespace().collect();

        let (base, username, password) = match fields.as_slice() {
            [share] if share.contains(SHARE_MARKER) => {
                let (server, token) = share.split_once(SHARE_MARKER).unwrap_or((share, ""));
                let token = token.replace('/', "");
                if token.is_empty() {
                    return Err(ForwardError::ConfigurationMismatch(format!(
                        "share link without token: {share}"
                    )));
                }
                (
                    format!("{}{}", server.trim_end_matches('/'), PUBLIC_WEBDAV_PATH),
                    token,
                    String::new(),
                )
            }
            [url, username] => (url.to_string(), username.to_string(), String::new()),
            [url, username, password, ..] => {
                (url.to_string(), username.to_string(), password.to_string())
            }
            _ => {
                return Err(ForwardError::ConfigurationMismatch(
                    "expected a share link or 'url username [password]'".into(),
                ));
            }
        };

        let mut base = validate_url(&base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            username,
            password,
        })
    }

    fn child(&self, segments: &[&str]) -> Result<Url, ForwardError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ForwardError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, client: &Client, method: Method, url: Url) -> RequestBuilder {
        client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }
}

/// `<uniqueId>_<name>`
pub fn folder_name(record: &PositionRecord) -> String {
    format!("{}_{}", record.unique_id, record.name)
}

/// `YYYYMMDD_HHMMSS.json` from the fix time, in the offset it was reported in
pub fn file_name(record: &PositionRecord) -> String {
    format!("{}.json", record.fix_time.format("%Y%m%d_%H%M%S"))
}

pub struct WebDavForwarder {
    client: Client,
}

impl WebDavForwarder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn exists(&self, target: &WebDavTarget, url: &Url) -> Result<bool, ForwardError> {
        let identifier = url.host_str().unwrap_or(url.as_str()).to_string();
        let response = target
            .request(&self.client, webdav_method(b"PROPFIND")?, url.clone())
            .header("Depth", "0")
            .send()
            .await
            .map_err(|e| ForwardError::transport(&identifier, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(status_error(identifier, response).await),
        }
    }

    async fn ensure_folder(&self, target: &WebDavTarget, url: &Url) -> Result<(), ForwardError> {
        if self.exists(target, url).await? {
            return Ok(());
        }

        tracing::debug!(folder = %url, "Creating WebDAV folder");
        let request = target.request(&self.client, webdav_method(b"MKCOL")?, url.clone());
        send_checked(request, url).await?;
        Ok(())
    }
}

fn webdav_method(name: &[u8]) -> Result<Method, ForwardError> {
    Method::from_bytes(name).map_err(|e| ForwardError::transport("webdav", e))
}

#[async_trait]
impl Forwarder for WebDavForwarder {
    fn name(&self) -> &'static str {
        "webdav"
    }

    async fn forward(&self, delivery: &Delivery<'_>, value: &str) -> Result<(), ForwardError> {
        let target = WebDavTarget::parse(value)?;
        tracing::debug!(base = %target.base, user = %target.username, "WebDAV target");

        let folder = folder_name(delivery.record);
        let folder_url = target.child(&[&folder, ""])?;
        let file_url = target.child(&[&folder, &file_name(delivery.record)])?;

        self.ensure_folder(&target, &folder_url).await?;

        let body = serde_json::to_vec_pretty(delivery.event.raw())?;
        let request = target
            .request(&self.client, Method::PUT, file_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        send_checked(request, &file_url).await?;

        Ok(())
    }
}
