use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::header::ACCEPT;
use splitdns_lib::{Decode, Message, Question, Reader};
use tokio::net::UdpSocket;

use crate::config::{Transport, UpstreamTarget};
use crate::pool::ClientPool;

pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

const DOH_CONTENT_TYPE: &str = "application/dns-message";
const UPSTREAM_RECV_BUF_SIZE: usize = 4096;

/// Sends `question` to `target` and returns the upstream's decoded
/// response. The response keeps the upstream's ID and flags; the caller
/// stamps it for the client.
pub async fn forward(
    question: &Question,
    target: &UpstreamTarget,
    id: u16,
    clients: &ClientPool,
) -> anyhow::Result<Message> {
    let query = Message::query(id, question.clone());
    match target.transport {
        Transport::Classic => exchange_udp(&query, target).await,
        Transport::Doh => exchange_doh(&query, target, clients).await,
    }
}

/// Appends `:port` only when the address doesn't already carry one.
fn dial_addr(address: &str, port: u16) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, port)
    }
}

async fn exchange_udp(query: &Message, target: &UpstreamTarget) -> anyhow::Result<Message> {
    let encoded = query.encode_to_vec()?;
    let addr = dial_addr(&target.address, target.port);

    tokio::time::timeout(FORWARD_TIMEOUT, async {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind an upstream socket")?;
        socket
            .connect(&addr)
            .await
            .with_context(|| format!("failed to connect to the upstream '{}'", addr))?;
        socket
            .send(&encoded)
            .await
            .with_context(|| format!("failed to send a query to the upstream '{}'", addr))?;

        let mut buf = [0; UPSTREAM_RECV_BUF_SIZE];
        let read = socket
            .recv(&mut buf)
            .await
            .with_context(|| format!("failed to read a response from the upstream '{}'", addr))?;

        let mut reader = Reader::new(&buf[..read]);
        Message::decode(&mut reader)
            .with_context(|| format!("malformed response from the upstream '{}'", addr))
    })
    .await
    .map_err(|_| anyhow!("upstream '{}' timed out", addr))?
}

/// RFC 8484 GET: the wire query rides in the `dns` parameter,
/// base64url-encoded without padding.
pub fn doh_url(address: &str, query_wire: &[u8]) -> String {
    format!("{}?dns={}", address, URL_SAFE_NO_PAD.encode(query_wire))
}

async fn exchange_doh(
    query: &Message,
    target: &UpstreamTarget,
    clients: &ClientPool,
) -> anyhow::Result<Message> {
    let encoded = query.encode_to_vec()?;
    let url = doh_url(&target.address, &encoded);

    let client = clients.acquire().await?;
    let response = tokio::time::timeout(FORWARD_TIMEOUT, async {
        let response = client
            .get(&url)
            .header(ACCEPT, DOH_CONTENT_TYPE)
            .send()
            .await
            .with_context(|| format!("DoH request to '{}' failed", target.address))?;

        if !response.status().is_success() {
            bail!(
                "DoH upstream '{}' returned status {}",
                target.address,
                response.status()
            );
        }

        response
            .bytes()
            .await
            .with_context(|| format!("failed to read a DoH response body from '{}'", target.address))
    })
    .await
    .map_err(|_| anyhow!("DoH upstream '{}' timed out", target.address))??;

    let mut reader = Reader::new(&response);
    Message::decode(&mut reader)
        .with_context(|| format!("malformed DoH response from '{}'", target.address))
}
