use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::debug;

use convoflow_app::ports::{WebhookClient, WebhookRequest, WebhookResponse};
use convoflow_domain::automation::HttpMethod;
use convoflow_domain::error::ConvoFlowError;

use crate::error::WebhookError;

const USER_AGENT: &str = concat!("convoflow/", env!("CARGO_PKG_VERSION"));

/// [`WebhookClient`] backed by a shared [`reqwest::Client`] connection pool.
#[derive(Clone)]
pub struct ReqwestWebhookClient {
    client: Client,
}

impl ReqwestWebhookClient {
    /// # Errors
    ///
    /// Returns [`WebhookError::Http`] when the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, WebhookError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    async fn send(&self, request: WebhookRequest) -> Result<WebhookResponse, WebhookError> {
        let method = method(request.method);
        let mut builder = self
            .client
            .request(method.clone(), &request.url)
            .headers(headers(&request)?)
            .timeout(request.timeout);
        if method != Method::GET {
            builder = builder.json(&request.body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url = %request.url, status, "webhook answered");
        Ok(WebhookResponse { status, body })
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn headers(request: &WebhookRequest) -> Result<HeaderMap, WebhookError> {
    let mut map = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let invalid = || WebhookError::InvalidHeader { name: name.clone() };
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header, value);
    }
    Ok(map)
}

impl WebhookClient for ReqwestWebhookClient {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookResponse, ConvoFlowError> {
        Ok(self.send(request).await?)
    }
}
