//! In-process transport double for executor, benchmark and swarm tests.
use crate::transport::{Reply, Transport, TransportError, Upload};
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Behaviour {
    Reply { status: u16, body: Bytes },
    Delayed { delay: Duration, status: u16, body: Bytes },
    Fail(String),
    Hang,
}

impl Behaviour {
    pub(crate) fn reply(status: u16, body: &'static str) -> Self {
        Behaviour::Reply {
            status,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    pub(crate) fn delayed(delay: Duration, status: u16, body: &'static str) -> Self {
        Behaviour::Delayed {
            delay,
            status,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    pub(crate) fn fail(message: &str) -> Self {
        Behaviour::Fail(message.to_string())
    }
}

type Responder = dyn Fn(&str, Option<&Upload>) -> Behaviour + Send + Sync;

#[derive(Clone)]
pub(crate) struct FakeTransport {
    responder: Arc<Responder>,
    urls: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<Upload>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, Option<&Upload>) -> Behaviour + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            urls: Arc::default(),
            uploads: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// 200 for health, a valid predictions body for predict.
    pub(crate) fn healthy() -> Self {
        Self::new(|url, _| {
            if url.ends_with("/health") {
                Behaviour::reply(200, r#"{"status": "healthy"}"#)
            } else {
                Behaviour::reply(200, r#"{"predictions": [{"label": "cat", "score": 0.9}]}"#)
            }
        })
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub(crate) fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    async fn respond(&self, url: &str, upload: Option<Upload>) -> Result<Reply, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let behaviour = (self.responder)(url, upload.as_ref());
        self.urls.lock().unwrap().push(url.to_string());
        if let Some(upload) = upload {
            self.uploads.lock().unwrap().push(upload);
        }
        tracing::trace!("fake call #{call} {url}");

        match behaviour {
            Behaviour::Reply { status, body } => Ok(Reply { status, body }),
            Behaviour::Delayed {
                delay,
                status,
                body,
            } => {
                tokio::time::sleep(delay).await;
                Ok(Reply { status, body })
            }
            Behaviour::Fail(message) => Err(TransportError::Other(message)),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> Result<Reply, TransportError> {
        self.respond(url, None).await
    }

    async fn post_file(&self, url: &str, upload: Upload) -> Result<Reply, TransportError> {
        self.respond(url, Some(upload)).await
    }
}
