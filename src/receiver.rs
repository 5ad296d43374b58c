use anyhow::{bail, Context, Result};
use log::{debug, trace};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

pub const CALLBACK_PATH: &str = "/Callback";

const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Connections that send no request head within this window are dropped,
/// browsers keep idle preconnect sockets open.
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><head><title>OAuth 2.0 Authentication Token Received</title></head>\
<body>Received verification code. You may now close this window.</body></html>";
const FAILURE_PAGE: &str = "<html><head><title>OAuth 2.0 Authentication Failed</title></head>\
<body>Authorization was not granted. You may now close this window.</body></html>";

/// Query parameters delivered to the callback by the consent page.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
}

/// Loopback HTTP listener receiving the authorization code redirect.
///
/// The socket is released when the receiver is dropped.
pub struct LocalServerReceiver {
    listener: TcpListener,
    addr: SocketAddr,
}

impl LocalServerReceiver {
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .with_context(|| format!("Failed to bind consent callback listener on port {}", port))?;
        let addr = listener.local_addr()?;
        debug!("Consent callback listener bound to {}", addr);

        Ok(LocalServerReceiver { listener, addr })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.addr, CALLBACK_PATH)
    }

    /// Serve requests until one reaches the callback path.
    pub async fn wait_for_code(&self) -> Result<AuthorizationResponse> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            trace!("Callback connection from {}", peer);

            let target = match tokio::time::timeout(
                REQUEST_HEAD_TIMEOUT,
                read_request_target(&mut stream),
            )
            .await
            {
                Ok(Ok(target)) => target,
                Err(_) => {
                    debug!("Dropping idle callback connection from {}", peer);
                    continue;
                }
                Ok(Err(e)) => {
                    debug!("Ignoring malformed callback request: {:#}", e);
                    respond(&mut stream, "400 Bad Request", "").await;
                    continue;
                }
            };

            let url = Url::parse(&format!("http://{}{}", self.addr, target))
                .context("Callback request target is not a valid URL")?;
            if url.path() != CALLBACK_PATH {
                trace!("Ignoring request for {}", url.path());
                respond(&mut stream, "404 Not Found", "").await;
                continue;
            }

            let result = parse_callback(&url);
            let page = if result.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
            respond(&mut stream, "200 OK", page).await;
            return result;
        }
    }
}

fn parse_callback(url: &Url) -> Result<AuthorizationResponse> {
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        bail!("Authorization was denied: {}", error);
    }

    match code {
        Some(code) => Ok(AuthorizationResponse { code, state }),
        None => bail!("Callback did not contain an authorization code"),
    }
}

async fn read_request_target(stream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];

    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.len() > MAX_REQUEST_HEAD {
            bail!("Request head exceeds {} bytes", MAX_REQUEST_HEAD);
        }
    }

    let head = String::from_utf8_lossy(&head);
    let request_line = head.lines().next().context("Empty request")?;
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) if target.starts_with('/') => Ok(target.to_string()),
        _ => bail!("Unsupported request line '{}'", request_line),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    // The browser may already have gone away, nothing to do about it.
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Failed to answer callback request: {}", e);
    }
    let _ = stream.shutdown().await;
}
