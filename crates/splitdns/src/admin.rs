use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::cache::ResponseCache;
use crate::rules::RuleSet;

/// Plain-text status endpoint, handy for probing the proxy with curl.
pub struct AdminServer {
    rules: Arc<RuleSet>,
    cache: Arc<ResponseCache>,
}

#[derive(Clone)]
struct AdminState {
    rules: Arc<RuleSet>,
    cache: Arc<ResponseCache>,
}

impl AdminServer {
    pub fn new(rules: Arc<RuleSet>, cache: Arc<ResponseCache>) -> Self {
        AdminServer { rules, cache }
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let state = AdminState {
            rules: self.rules,
            cache: self.cache,
        };
        let router = Router::new().route("/", get(status)).with_state(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind the admin listener to '{}'", addr))?;
        tracing::info!(addr = %addr, "admin endpoint is up");

        axum::serve(listener, router)
            .await
            .context("admin server error")
    }
}

async fn status(State(state): State<AdminState>) -> String {
    format!(
        "splitdns is up\nrules: {}\nblocked: {}\ncached responses: {}\n",
        state.rules.rule_count(),
        state.rules.blocked_count(),
        state.cache.len().await,
    )
}
