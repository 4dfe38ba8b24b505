// Local HTTP responder and token doubles for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::auth::{AccessToken, TokenProvider};
use crate::FcmError;

/// Issues `token-1`, `token-2`, ... each valid for `ttl`.
pub(crate) struct SequenceTokens {
    ttl: Duration,
    fetches: AtomicUsize,
    fail_first: AtomicBool,
}

impl SequenceTokens {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            fetches: AtomicUsize::new(0),
            fail_first: AtomicBool::new(false),
        }
    }

    /// Make the first fetch fail. It still counts as a fetch.
    pub(crate) fn failing_first(self) -> Self {
        self.fail_first.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for SequenceTokens {
    async fn fetch(&self) -> Result<AccessToken, FcmError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_first.swap(false, Ordering::SeqCst) {
            return Err(FcmError::Auth("token endpoint unavailable".into()));
        }
        Ok(AccessToken::expiring_in(format!("token-{n}"), self.ttl))
    }
}

pub(crate) fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Answer one connection per canned response, in order. The handle yields
/// the raw requests received.
pub(crate) async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut stream).await);
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
        requests
    });
    (url, handle)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
