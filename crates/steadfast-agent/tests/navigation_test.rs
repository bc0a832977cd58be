//! Navigation verdicts from a configuration as the authority would publish it

use std::sync::Arc;
use steadfast_agent::{
    AgentIdentity, AgentSettings, Connector, Enforcement, EnforcementAgent, MemorySurface,
    NavigationGuardian,
};
use steadfast_core_config::BlockConfiguration;
use steadfast_proto::BlockedDomainsUpdate;
use tokio::io::DuplexStream;

struct NoBridge;

#[async_trait::async_trait]
impl Connector for NoBridge {
    type Stream = DuplexStream;

    async fn connect(&self) -> std::io::Result<DuplexStream> {
        Err(std::io::ErrorKind::ConnectionRefused.into())
    }
}

fn agent(surface: Arc<MemorySurface>) -> EnforcementAgent<MemorySurface, NoBridge> {
    EnforcementAgent::new(
        surface,
        NoBridge,
        AgentIdentity::generate("chrome"),
        NavigationGuardian::new("chrome-extension://steadfast"),
        AgentSettings::default(),
    )
}

fn configured(is_blocking: bool) -> BlockedDomainsUpdate {
    let mut config = BlockConfiguration {
        is_blocking,
        ..Default::default()
    };
    config.add_domains(["example.com"]).unwrap();
    config.add_exception("example.com", ["/docs"]).unwrap();
    BlockedDomainsUpdate::from_config(&config)
}

#[tokio::test]
async fn test_exception_domain_and_ip_literal() {
    let surface = Arc::new(MemorySurface::new("chrome"));
    let mut agent = agent(surface.clone());
    agent.apply_update(configured(true)).await;

    assert_eq!(
        agent.on_navigation(1, "https://example.com/docs/x").await,
        Enforcement::Allowed
    );
    assert_eq!(
        agent.on_navigation(2, "https://example.com/other").await,
        Enforcement::Redirected
    );
    assert_eq!(
        agent.on_navigation(3, "http://93.184.216.34/").await,
        Enforcement::Redirected
    );

    let redirected: Vec<_> = surface
        .snapshot()
        .redirects
        .into_iter()
        .map(|(page, _)| page)
        .collect();
    assert_eq!(redirected, vec![2, 3]);
}

#[tokio::test]
async fn test_self_management_guard_follows_blocking_flag() {
    let surface = Arc::new(MemorySurface::new("chrome"));
    let mut agent = agent(surface.clone());

    agent.apply_update(configured(true)).await;
    assert_eq!(
        agent.on_navigation(1, "chrome://extensions").await,
        Enforcement::Redirected
    );

    agent.apply_update(configured(false)).await;
    assert_eq!(
        agent.on_navigation(2, "chrome://extensions").await,
        Enforcement::Allowed
    );
}

#[tokio::test]
async fn test_unreachable_bridge_is_not_fail_open() {
    let surface = Arc::new(MemorySurface::new("chrome"));
    let mut agent = agent(surface);
    agent.apply_update(configured(true)).await;

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    agent.run(cancel).await;

    assert!(agent.rules().is_blocking());
    assert_eq!(
        agent.on_navigation(9, "https://www.example.com/").await,
        Enforcement::Redirected
    );
}
