//! reqwest-backed transport.

use super::{Body, HttpRequest, HttpResponse, Method, Transport, TransportError};
use crate::config::ServicesConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client with a per-request timeout.
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("ancalagon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client })
    }

    /// Client bounded by `services.request_timeout_secs`.
    pub fn from_config(services: &ServicesConfig) -> Result<Self, TransportError> {
        Self::new(services.request_timeout())
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Connect(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "Sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::File {
                field,
                file_name,
                data,
                fields,
            } => {
                let mut form = Form::new().part(field, Part::bytes(data.to_vec()).file_name(file_name));
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_error)?;

        debug!(status, bytes = body.len(), "Received response");
        Ok(HttpResponse { status, body })
    }
}
