//! Scripted backend links for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mcp_cookie_relay::config::SupervisorConfig;
use mcp_cookie_relay::core::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
use mcp_cookie_relay::transport::{Link, LinkFactory};
use mcp_cookie_relay::utils::errors::{McpError, McpResult};
use mcp_cookie_relay::{ConnectionSupervisor, RequestForwarder};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const BACKEND_URL: &str = "http://127.0.0.1:12306/mcp";

/// A link whose liveness the test flips by hand
pub struct FakeLink {
    pub id: u32,
    pub alive: AtomicBool,
    pub hang_probes: AtomicBool,
    pub time_out_calls: AtomicBool,
    pub probes: AtomicU32,
    pub invokes: AtomicU32,
    pub closed: AtomicBool,
}

impl FakeLink {
    fn new(id: u32) -> Self {
        Self {
            id,
            alive: AtomicBool::new(true),
            hang_probes: AtomicBool::new(false),
            time_out_calls: AtomicBool::new(false),
            probes: AtomicU32::new(0),
            invokes: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn invokes(&self) -> u32 {
        self.invokes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_alive(&self) -> McpResult<()> {
        if self.alive.load(Ordering::SeqCst) && !self.is_closed() {
            Ok(())
        } else {
            Err(McpError::TransportError("Transport not connected".to_string()))
        }
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> McpResult<Value> {
        self.invokes.fetch_add(1, Ordering::SeqCst);
        self.check_alive()?;

        if self.time_out_calls.load(Ordering::SeqCst) {
            return Err(McpError::Timeout(timeout.as_millis() as u64));
        }

        Ok(json!({
            "content": [{
                "type": "text",
                "text": format!("{} via link {}", name, self.id),
            }],
            "echo": arguments,
        }))
    }

    async fn send(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if request.method == "ping" {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.hang_probes.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
        }
        self.check_alive()?;

        let id = request.id.unwrap_or(RequestId::Number(0));
        Ok(JsonRpcResponse::success(id, json!({})))
    }

    async fn is_connected(&self) -> bool {
        self.check_alive().is_ok()
    }

    async fn close(&self) -> McpResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory whose open outcomes are scripted by the test
#[derive(Default)]
pub struct ScriptedFactory {
    opens: AtomicU32,
    fail_next: AtomicU32,
    fail_all: AtomicBool,
    calls_time_out: AtomicBool,
    open_delay: Mutex<Duration>,
    links: Mutex<Vec<Arc<FakeLink>>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every open until told otherwise
    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail_all.store(unreachable, Ordering::SeqCst);
    }

    /// Fail only the next `count` opens
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Links opened from now on time out every tool call
    pub fn set_calls_time_out(&self, time_out: bool) {
        self.calls_time_out.store(time_out, Ordering::SeqCst);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn link(&self, index: usize) -> Arc<FakeLink> {
        self.links.lock()[index].clone()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }
}

#[async_trait]
impl LinkFactory for ScriptedFactory {
    async fn open(&self, _endpoint: &Url) -> McpResult<Arc<dyn Link>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_all.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionError("connection refused".to_string()));
        }
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(McpError::ConnectionError("connection refused".to_string()));
        }

        let mut links = self.links.lock();
        let link = Arc::new(FakeLink::new(links.len() as u32 + 1));
        link.time_out_calls
            .store(self.calls_time_out.load(Ordering::SeqCst), Ordering::SeqCst);
        links.push(link.clone());
        Ok(link)
    }
}

pub fn supervisor(factory: Arc<ScriptedFactory>) -> ConnectionSupervisor {
    ConnectionSupervisor::new(
        BACKEND_URL.parse().unwrap(),
        factory,
        SupervisorConfig::default(),
    )
}

pub fn forwarder(factory: Arc<ScriptedFactory>) -> RequestForwarder {
    RequestForwarder::new(supervisor(factory), Duration::from_secs(30))
}

pub fn url_arguments(url: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("url".to_string(), json!(url));
    arguments
}
