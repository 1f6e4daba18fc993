use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use splitdns_lib::{Decode, DnsHeader, Message, Rcode, Reader};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::cache::ResponseCache;
use crate::forwarder;
use crate::pool::ClientPool;
use crate::rules::{normalize_fqdn, Resolution, RuleSet};

/// Replies larger than this get truncated with TC set, per classic UDP
/// limits.
pub const MAX_UDP_MSG_SIZE: usize = 512;
const RECV_BUF_SIZE: usize = 4096;

struct Job {
    data: Vec<u8>,
    peer: SocketAddr,
    /// Held for the lifetime of the request; releasing it frees an
    /// admission slot
    _permit: OwnedSemaphorePermit,
}

pub struct DnsServer {
    socket: Arc<UdpSocket>,
    rules: Arc<RuleSet>,
    cache: Arc<ResponseCache>,
    clients: Arc<ClientPool>,
    max_clients: usize,
    max_workers: usize,
}

impl DnsServer {
    pub async fn bind(
        listen: SocketAddr,
        rules: Arc<RuleSet>,
        cache: Arc<ResponseCache>,
        clients: Arc<ClientPool>,
        max_clients: usize,
        max_workers: usize,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("failed to bind the listener to '{}'", listen))?;
        tracing::info!(addr = %listen, "listening for DNS queries");
        Ok(DnsServer {
            socket: Arc::new(socket),
            rules,
            cache,
            clients,
            max_clients,
            max_workers,
        })
    }

    /// Accept loop plus the worker pool. Each datagram must win an
    /// admission slot before it is queued; when all slots are busy the
    /// client gets an immediate SERVFAIL instead of waiting.
    pub async fn run(self) -> anyhow::Result<()> {
        // Every queued job holds an admission permit, so max_clients slots
        // make send() below non-blocking and keep the accept loop live
        let (job_tx, job_rx) = mpsc::channel::<Job>(self.max_clients.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let slots = Arc::new(Semaphore::new(self.max_clients));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.max_workers.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let socket = Arc::clone(&self.socket);
            let rules = Arc::clone(&self.rules);
            let cache = Arc::clone(&self.cache);
            let clients = Arc::clone(&self.clients);
            workers.spawn(async move {
                loop {
                    let job = match job_rx.lock().await.recv().await {
                        Some(job) => job,
                        None => break,
                    };
                    let peer = job.peer;
                    if let Err(e) =
                        handle_request(job, &socket, &rules, &cache, &clients).await
                    {
                        tracing::warn!(worker = worker_id, client = %peer, "failed to handle a query: {:#}", e);
                    }
                }
            });
        }

        let mut buf = [0; RECV_BUF_SIZE];
        loop {
            // per-datagram failures never take down the accept loop
            let (read, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("failed to read from the listening socket: {}", e);
                    continue;
                }
            };
            let data = buf[..read].to_vec();

            match Arc::clone(&slots).try_acquire_owned() {
                Ok(permit) => {
                    let job = Job {
                        data,
                        peer,
                        _permit: permit,
                    };
                    if job_tx.send(job).await.is_err() {
                        anyhow::bail!("all of the workers have exited");
                    }
                }
                Err(_) => {
                    tracing::warn!(client = %peer, "no free slots, refusing the query");
                    if let Some(refusal) = refusal_reply(&data) {
                        if let Err(e) = send_reply(&self.socket, peer, refusal).await {
                            tracing::warn!(client = %peer, "failed to send a refusal: {:#}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Builds the SERVFAIL sent when admission is refused. Echoes the
/// question section when the query parses, falls back to a header-only
/// reply, and gives up on garbage.
fn refusal_reply(data: &[u8]) -> Option<Message> {
    let mut reader = Reader::new(data);
    if let Ok(request) = Message::decode(&mut reader) {
        let mut reply = Message::reply_to(&request.header);
        reply.header.rcode = Rcode::ServFail;
        reply.questions = request.questions;
        return Some(reply);
    }

    let mut reader = Reader::new(data);
    let header = DnsHeader::decode(&mut reader).ok()?;
    let mut reply = Message::reply_to(&header);
    reply.header.rcode = Rcode::ServFail;
    Some(reply)
}

async fn handle_request(
    job: Job,
    socket: &UdpSocket,
    rules: &RuleSet,
    cache: &ResponseCache,
    clients: &ClientPool,
) -> anyhow::Result<()> {
    let mut reader = Reader::new(&job.data);
    let request = match Message::decode(&mut reader) {
        Ok(request) => request,
        Err(e) => {
            // nothing sensible to reply with
            tracing::debug!(client = %job.peer, "dropping an unparseable datagram: {:#}", e);
            return Ok(());
        }
    };

    for question in &request.questions {
        let qname = normalize_fqdn(&question.qname);

        if rules.is_blocked(&qname) {
            tracing::info!(qname = %qname, client = %job.peer, "blocked");
            let mut reply = Message::reply_to(&request.header);
            reply.header.rcode = Rcode::NxDomain;
            reply.questions.push(question.clone());
            send_reply(socket, job.peer, reply).await?;
            continue;
        }

        if let Some(mut cached) = cache.get(&qname).await {
            tracing::debug!(qname = %qname, "cache hit");
            // the stored copy echoes whoever populated the cache; the reply
            // must echo the current question instead
            cached.questions = vec![question.clone()];
            cached.stamp_reply(&request.header);
            send_reply(socket, job.peer, cached).await?;
            continue;
        }

        let resolution = rules.resolve(&qname);
        let (target, via) = match &resolution {
            Resolution::Blocked => unreachable!("checked above"),
            Resolution::Matched { target, rule } => (target, rule.as_str()),
            Resolution::Default { target } => (target, "default"),
        };
        tracing::debug!(qname = %qname, upstream = %target.address, rule = via, "forwarding");

        let mut response =
            match forwarder::forward(question, target, request.header.id, clients).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(qname = %qname, upstream = %target.address, "forwarding failed: {:#}", e);
                    let mut reply = Message::reply_to(&request.header);
                    reply.header.rcode = Rcode::ServFail;
                    reply.questions.push(question.clone());
                    send_reply(socket, job.peer, reply).await?;
                    continue;
                }
            };

        // only responses that actually resolved to an address are worth
        // caching; the copy keeps the upstream's header for re-stamping
        if response.has_address_answer() {
            cache.put(qname, response.clone()).await;
        }

        response.stamp_reply(&request.header);
        send_reply(socket, job.peer, response).await?;
    }

    Ok(())
}

async fn send_reply(socket: &UdpSocket, peer: SocketAddr, reply: Message) -> anyhow::Result<()> {
    let mut encoded = reply.encode_to_vec()?;
    if encoded.len() > MAX_UDP_MSG_SIZE {
        encoded = reply.to_truncated().encode_to_vec()?;
    }
    socket
        .send_to(&encoded, peer)
        .await
        .with_context(|| format!("failed to send a reply to '{}'", peer))?;
    Ok(())
}
