//! The seam between the transport and the network.

use crate::error::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use freesail_core::protocol::{UpstreamMessage, SESSION_HEADER};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Raw bytes of an open downstream stream.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// An open downstream connection.
pub struct Connection {
    /// Session id announced out of band, if the connector saw one.
    pub session_id: Option<String>,

    /// Downstream bytes, in arrival order.
    pub frames: ByteStream,
}

/// Opens downstream streams and delivers upstream requests.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open the downstream stream, declaring the supported catalogs.
    async fn open(&self, catalogs: &[String]) -> Result<Connection>;

    /// Deliver one upstream message.
    async fn send(&self, session_id: Option<&str>, message: &UpstreamMessage) -> Result<()>;

    /// Refresh the session's activity time.
    async fn ping(&self, session_id: &str) -> Result<()>;
}

/// Connector speaking the gateway's HTTP interface.
pub struct HttpConnector {
    client: Client,
    base_url: Url,
}

impl HttpConnector {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn open(&self, catalogs: &[String]) -> Result<Connection> {
        let mut url = self.endpoint("stream")?;
        if !catalogs.is_empty() {
            url.query_pairs_mut()
                .append_pair("catalogs", &catalogs.join(","));
        }
        debug!("Opening stream {}", url);

        let response = self.client.get(url).send().await?;
        let response = check_status(response).await?;

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let frames = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(Connection { session_id, frames })
    }

    async fn send(&self, session_id: Option<&str>, message: &UpstreamMessage) -> Result<()> {
        let mut request = self.client.post(self.endpoint("message")?).json(message);
        if let Some(session_id) = session_id {
            request = request.header(SESSION_HEADER, session_id);
        }
        check_status(request.send().await?).await?;
        Ok(())
    }

    async fn ping(&self, session_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("ping")?)
            .header(SESSION_HEADER, session_id)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base() {
        let connector = HttpConnector::new("http://127.0.0.1:18790").unwrap();
        assert_eq!(
            connector.endpoint("stream").unwrap().as_str(),
            "http://127.0.0.1:18790/stream"
        );

        let nested = HttpConnector::new("http://host/freesail/").unwrap();
        assert_eq!(
            nested.endpoint("message").unwrap().as_str(),
            "http://host/freesail/message"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpConnector::new("not a url"),
            Err(TransportError::Url(_))
        ));
    }
}
