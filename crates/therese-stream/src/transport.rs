use futures::StreamExt as _;
use futures::stream::BoxStream;
use tracing::debug;

use crate::config::BackendConfig;
use crate::errors::ClientError;

/// Raw body of a streaming response, as it arrives from the network.
pub type ByteStream = BoxStream<'static, Result<bytes::Bytes, std::io::Error>>;

/// Boundary between the client and the backend.
///
/// `HttpTransport` is the production implementation; tests substitute an
/// in-memory one.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends `body` to `path` and returns the event-stream body once the
    /// backend has accepted the request.
    async fn open_stream(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ByteStream, ClientError>;

    /// `POST` with a JSON body, returning the decoded JSON response.
    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError>;

    /// `GET` returning the decoded JSON response.
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ClientError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpTransport {
    pub fn new(config: BackendConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, ClientError> {
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open_stream(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ByteStream, ClientError> {
        let url = self.config.url(path);
        debug!(%url, "opening event stream");
        let response = self
            .send(
                self.client
                    .post(&url)
                    .header(reqwest::header::ACCEPT, "text/event-stream")
                    .json(&body),
            )
            .await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed())
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let url = self.config.url(path);
        let response = self.send(self.client.post(&url).json(&body)).await?;
        Self::read_json(response).await
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ClientError> {
        let url = self.config.url(path);
        let response = self.send(self.client.get(&url)).await?;
        Self::read_json(response).await
    }
}
