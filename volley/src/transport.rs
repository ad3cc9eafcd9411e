//! Network seam between the request executors and the service under test.
use bytes::Bytes;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("{}", error_chain(.0))]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Bytes,
}

/// A single multipart file field.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field: &'static str,
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn jpeg(file_name: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            field: "file",
            file_name,
            content_type: "image/jpeg",
            bytes,
        }
    }
}

/// Issues one request and reads the whole body before returning.
///
/// Timeouts are enforced by the caller, so implementations may hang.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    async fn get(&self, url: &str) -> Result<Reply, TransportError>;

    async fn post_file(&self, url: &str, upload: Upload) -> Result<Reply, TransportError>;
}

/// `reqwest`-backed transport sharing one connection pool across all requests.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("volley/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Reply, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(Reply { status, body })
    }

    async fn post_file(&self, url: &str, upload: Upload) -> Result<Reply, TransportError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(upload.content_type)?;
        let form = Form::new().part(upload.field, part);

        let response = self.client.post(url).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(Reply { status, body })
    }
}

// reqwest's top-level message hides the cause ("error sending request for url"), so append
// the source chain.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
