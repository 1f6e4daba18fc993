use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinSet;

use crate::admin::AdminServer;
use crate::cache::ResponseCache;
use crate::cli::Args;
use crate::config::Config;
use crate::forwarder::FORWARD_TIMEOUT;
use crate::pool::ClientPool;
use crate::rules::{RuleSet, RuleSetBuilder};
use crate::server::DnsServer;

pub struct App;

impl App {
    /// Wires everything together and runs until the DNS server task dies.
    pub async fn run_until_completion(args: Args) -> anyhow::Result<()> {
        let config = Config::load(&args.config)?;
        let listen = args.listen.unwrap_or(config.server.listen);

        let rules = Arc::new(load_rules(&config).await);
        tracing::info!(
            rules = rules.rule_count(),
            blocked = rules.blocked_count(),
            "rules are ready"
        );

        let cache = Arc::new(ResponseCache::new(config.server.cache_size));
        let flush_task = cache.spawn_flush_task(Duration::from_secs(config.server.cache_flush_secs.max(1)));

        let clients = Arc::new(
            ClientPool::new(config.server.max_connects, FORWARD_TIMEOUT)
                .context("failed to set up the DoH client pool")?,
        );

        let server = DnsServer::bind(
            listen,
            Arc::clone(&rules),
            Arc::clone(&cache),
            clients,
            config.server.max_clients,
            config.server.max_workers,
        )
        .await?;

        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();
        tasks.spawn(server.run());
        if let Some(admin_listen) = config.server.admin_listen {
            let admin = AdminServer::new(Arc::clone(&rules), Arc::clone(&cache));
            tasks.spawn(admin.serve(admin_listen));
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => tracing::info!("a task has finished"),
                Ok(Err(e)) => {
                    flush_task.abort();
                    return Err(e);
                }
                Err(e) => {
                    flush_task.abort();
                    return Err(e).context("a task has panicked");
                }
            }
        }

        flush_task.abort();
        Ok(())
    }
}

async fn load_rules(config: &Config) -> RuleSet {
    let mut builder = RuleSetBuilder::new(config.common_upstream.target());
    for upstream in &config.upstreams {
        match &upstream.rules_file {
            Some(path) => builder.load_rules(path, upstream.target()).await,
            None => {
                tracing::warn!(upstream = %upstream.address, "upstream has no rules file, nothing will be routed to it")
            }
        }
    }
    if let Some(path) = &config.blocklist_file {
        builder.load_blocklist(path).await;
    }
    builder.build()
}
