use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use surge_ping::{Client, ICMP, PingIdentifier, PingSequence};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::types::ProbeOutcome;

const PING_PAYLOAD: [u8; 56] = [0; 56];

/// Protocol a check is probed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Icmp,
    Tcp,
    Http,
}

impl ProbeKind {
    pub fn parse(check_type: &str) -> Option<Self> {
        match check_type {
            "icmp" => Some(ProbeKind::Icmp),
            "tcp" => Some(ProbeKind::Tcp),
            "http" => Some(ProbeKind::Http),
            _ => None,
        }
    }
}

/// Reachability probe. Implementations must return promptly once
/// `cancel` fires.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, cancel: &CancellationToken, target: &str) -> ProbeOutcome;
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// ICMP echo probe; needs raw socket privileges
pub struct IcmpProbe {
    timeout: Duration,
    count: u16,
}

impl IcmpProbe {
    pub fn new(timeout: Duration, count: u16) -> Self {
        Self { timeout, count: count.max(1) }
    }
}

async fn resolve(target: &str) -> Result<IpAddr, String> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|e| format!("resolve {target}: {e}"))?;
    addrs.next().map(|addr| addr.ip()).ok_or_else(|| format!("resolve {target}: no addresses"))
}

#[async_trait]
impl Probe for IcmpProbe {
    async fn check(&self, cancel: &CancellationToken, target: &str) -> ProbeOutcome {
        let ip = match resolve(target).await {
            Ok(ip) => ip,
            Err(e) => return ProbeOutcome::down(e),
        };

        let kind = if ip.is_ipv4() { ICMP::V4 } else { ICMP::V6 };
        let client = match Client::new(&surge_ping::Config::builder().kind(kind).build()) {
            Ok(client) => client,
            Err(e) => return ProbeOutcome::down(format!("open icmp socket: {e}")),
        };

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.timeout);

        let mut sent = 0u16;
        let mut rtts = Vec::with_capacity(self.count as usize);
        let mut last_error = None;

        for seq in 0..self.count {
            if cancel.is_cancelled() {
                break;
            }
            sent += 1;
            tokio::select! {
                _ = cancel.cancelled() => {
                    last_error = Some("cancelled".to_string());
                    break;
                }
                reply = pinger.ping(PingSequence(seq), &PING_PAYLOAD) => match reply {
                    Ok((_packet, rtt)) => rtts.push(rtt.as_secs_f64() * 1000.0),
                    Err(e) => last_error = Some(e.to_string()),
                },
            }
        }

        if rtts.is_empty() {
            return ProbeOutcome::down(last_error.unwrap_or_else(|| "100% packet loss".to_string()));
        }

        let received = rtts.len() as f64;
        ProbeOutcome {
            success: true,
            latency_ms: rtts.iter().sum::<f64>() / received,
            packet_loss: (f64::from(sent) - received) / f64::from(sent),
            error: None,
        }
    }
}

/// TCP connect probe, target is `host:port`
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, cancel: &CancellationToken, target: &str) -> ProbeOutcome {
        let start = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => ProbeOutcome::down_after(elapsed_ms(start), "cancelled"),
            res = timeout(self.timeout, tokio::net::TcpStream::connect(target)) => match res {
                Ok(Ok(_stream)) => ProbeOutcome::up(elapsed_ms(start)),
                Ok(Err(e)) => ProbeOutcome::down_after(elapsed_ms(start), format!("tcp connect failed: {e}")),
                Err(_) => ProbeOutcome::down_after(elapsed_ms(start), "tcp connect timed out"),
            },
        }
    }
}

/// HTTP(S) GET probe; only 2xx counts as up. Certificates are not verified
/// since monitored devices commonly serve self-signed ones.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, cancel: &CancellationToken, target: &str) -> ProbeOutcome {
        let start = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => ProbeOutcome::down_after(elapsed_ms(start), "cancelled"),
            res = self.client.get(target).send() => match res {
                Ok(response) if response.status().is_success() => ProbeOutcome::up(elapsed_ms(start)),
                Ok(response) => ProbeOutcome::down_after(
                    elapsed_ms(start),
                    format!("unexpected status {}", response.status().as_u16()),
                ),
                Err(e) => ProbeOutcome::down_after(elapsed_ms(start), format!("http request failed: {e}")),
            },
        }
    }
}

/// One probe per protocol, looked up by the check's type tag
#[derive(Clone, Default)]
pub struct ProbeSet {
    probes: HashMap<ProbeKind, Arc<dyn Probe>>,
}

impl ProbeSet {
    /// The built-in ICMP, TCP and HTTP probes
    pub fn standard(timeout: Duration, ping_count: u16) -> Result<Self> {
        Ok(Self::default()
            .with(ProbeKind::Icmp, Arc::new(IcmpProbe::new(timeout, ping_count)))
            .with(ProbeKind::Tcp, Arc::new(TcpProbe::new(timeout)))
            .with(ProbeKind::Http, Arc::new(HttpProbe::new(timeout)?)))
    }

    pub fn with(mut self, kind: ProbeKind, probe: Arc<dyn Probe>) -> Self {
        self.probes.insert(kind, probe);
        self
    }

    pub fn get(&self, check_type: &str) -> Option<Arc<dyn Probe>> {
        ProbeKind::parse(check_type).and_then(|kind| self.probes.get(&kind).cloned())
    }
}
