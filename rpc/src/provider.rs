//! Multi-node JSON-RPC provider.
//!
//! Each call is sent to every configured node concurrently. Per node, the
//! same request is retried on transport failures with exponential
//! backoff; every attempt is bounded by the configured timeout. The first
//! node to return a result wins.

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_utils::{retry, RetryPolicy};

use crate::config::RpcConfig;
use crate::error::{RpcError, TransportError};
use crate::jsonrpc::{parse_reply, JsonRpcRequest};
use crate::shard::ShardCache;
use crate::transport::{HttpTransport, Transport};

pub struct RpcProvider {
    transport: Arc<dyn Transport>,
    nodes: Vec<String>,
    retry: RetryPolicy,
    timeout: Duration,
    next_id: AtomicU64,
    pub(crate) shards: ShardCache,
}

impl RpcProvider {
    /// Provider speaking HTTP to the configured nodes.
    pub fn new(config: &RpcConfig) -> Result<Self, RpcError> {
        Self::with_transport(config, Arc::new(HttpTransport::new(config.timeout())))
    }

    pub fn with_transport(
        config: &RpcConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RpcError> {
        let nodes = config.node_urls()?;
        Ok(Self {
            transport,
            nodes,
            retry: config.retry_policy(),
            timeout: config.timeout(),
            next_id: AtomicU64::new(1),
            shards: ShardCache::new(config.shard_cache_ttl()),
        })
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Call `method` on every node and return the first result.
    ///
    /// If every node fails, the error lists each distinct failure, unless
    /// every node reported the item as not found.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest::new(id, method, params).to_json();
        tracing::debug!(method, id, nodes = self.nodes.len(), body = %body, "rpc request");

        if let [only] = self.nodes.as_slice() {
            return self.call_node(only, method, &body).await;
        }

        let mut pending: FuturesUnordered<_> = self
            .nodes
            .iter()
            .map(|url| self.call_node(url, method, &body))
            .collect();
        let mut errors = Vec::with_capacity(self.nodes.len());
        while let Some(result) = pending.next().await {
            match result {
                Ok(value) => return Ok(value),
                Err(e) => errors.push(e),
            }
        }
        Err(aggregate(errors))
    }

    async fn call_node(&self, url: &str, method: &str, body: &Value) -> Result<Value, RpcError> {
        let result = retry(&self.retry, RpcError::is_retryable, |attempt| async move {
            let reply = match tokio::time::timeout(self.timeout, self.transport.post(url, body)).await
            {
                Ok(reply) => reply?,
                Err(_) => return Err(TransportError::Timeout(self.timeout).into()),
            };
            tracing::debug!(url, method, attempt, status = reply.status, body = %reply.body, "rpc response");
            parse_reply(reply)
        })
        .await;
        if let Err(e) = &result {
            tracing::debug!(url, method, error = %e, "node call failed");
        }
        result
    }
}

fn aggregate(mut errors: Vec<RpcError>) -> RpcError {
    if errors.len() == 1 {
        return errors.remove(0);
    }
    if let Some(not_found) = errors.iter().find(|e| e.is_not_found()) {
        if errors.iter().all(RpcError::is_not_found) {
            return not_found.clone();
        }
    }
    RpcError::AllNodesFailed(errors)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::HttpReply;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub(crate) enum Script {
        Reply(u16, String),
        Fail(TransportError),
        Hang,
    }

    /// Replays a fixed response per URL; the last entry repeats.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        scripts: Mutex<HashMap<String, Vec<Script>>>,
        pub(crate) calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn script(&self, url: &str, steps: Vec<Script>) {
            self.scripts.lock().unwrap().insert(url.to_string(), steps);
        }

        pub(crate) fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError> {
            self.calls.lock().unwrap().push((url.to_string(), body.clone()));
            let step = {
                let mut scripts = self.scripts.lock().unwrap();
                let steps = scripts.get_mut(url).expect("unscripted url");
                if steps.len() > 1 {
                    steps.remove(0)
                } else {
                    match &steps[0] {
                        Script::Reply(s, b) => Script::Reply(*s, b.clone()),
                        Script::Fail(e) => Script::Fail(e.clone()),
                        Script::Hang => Script::Hang,
                    }
                }
            };
            match step {
                Script::Reply(status, body) => Ok(HttpReply { status, body }),
                Script::Fail(e) => Err(e),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    pub(crate) fn ok(result: Value) -> Script {
        Script::Reply(200, json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
    }

    pub(crate) fn unreachable() -> Script {
        Script::Fail(TransportError::Unreachable("connection refused".into()))
    }

    pub(crate) fn provider(urls: &[&str], transport: Arc<ScriptedTransport>) -> RpcProvider {
        let config = RpcConfig {
            nodes: urls.iter().map(|u| u.to_string()).collect(),
            retry_attempts: 3,
            retry_initial_backoff_ms: 0,
            retry_max_backoff_ms: 0,
            timeout_secs: 1,
            ..RpcConfig::default()
        };
        RpcProvider::with_transport(&config, transport).unwrap()
    }

    const A: &str = "http://a.node";
    const B: &str = "http://b.node";
    const C: &str = "http://c.node";

    #[tokio::test]
    async fn two_failing_nodes_one_good_succeeds() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(A, vec![unreachable()]);
        transport.script(B, vec![unreachable()]);
        transport.script(C, vec![ok(json!({"value": 1}))]);
        let provider = provider(&[A, B, C], transport);
        let result = provider.call("ren_queryConfig", json!({})).await;
        assert_eq!(result, Ok(json!({"value": 1})));
    }

    #[tokio::test]
    async fn transport_failures_are_retried_with_same_payload() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(A, vec![unreachable(), unreachable(), ok(json!(true))]);
        let provider = provider(&[A], transport.clone());
        assert_eq!(provider.call("m", json!({"k": 1})).await, Ok(json!(true)));
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, body)| body == &calls[0].1));
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(A, vec![Script::Reply(503, "unavailable".into())]);
        let provider = provider(&[A], transport.clone());
        let err = provider.call("m", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::Transport(TransportError::Status { status: 503, .. })
        ));
        assert_eq!(transport.calls_to(A), 3);
    }

    #[tokio::test]
    async fn protocol_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(
            A,
            vec![Script::Reply(200, r#"{"error":{"code":-32600,"message":"bad"}}"#.into())],
        );
        let provider = provider(&[A], transport.clone());
        let err = provider.call("m", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol { .. }));
        assert_eq!(transport.calls_to(A), 1);
    }

    #[tokio::test]
    async fn all_failing_nodes_aggregate() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(A, vec![unreachable()]);
        transport.script(B, vec![Script::Reply(200, r#"{"error":"rejected"}"#.into())]);
        let provider = provider(&[A, B], transport);
        match provider.call("m", json!({})).await.unwrap_err() {
            RpcError::AllNodesFailed(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_everywhere_surfaces_not_found() {
        let transport = Arc::new(ScriptedTransport::default());
        let not_found = || Script::Reply(200, r#"{"error":"tx not found"}"#.into());
        transport.script(A, vec![not_found()]);
        transport.script(B, vec![not_found()]);
        let provider = provider(&[A, B], transport);
        assert!(provider.call("m", json!({})).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn not_found_on_one_node_falls_through_to_another() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(A, vec![Script::Reply(200, r#"{"error":"tx not found"}"#.into())]);
        transport.script(B, vec![ok(json!("found"))]);
        let provider = provider(&[A, B], transport);
        assert_eq!(provider.call("m", json!({})).await, Ok(json!("found")));
    }

    #[tokio::test]
    async fn hung_attempt_times_out_and_retries() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(A, vec![Script::Hang, ok(json!(1))]);
        let provider = provider(&[A], transport.clone());
        assert_eq!(provider.call("m", json!({})).await, Ok(json!(1)));
        assert_eq!(transport.calls_to(A), 2);
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(A, vec![ok(json!(null))]);
        let provider = provider(&[A], transport.clone());
        let _ = provider.call("m", json!({})).await;
        let _ = provider.call("m", json!({})).await;
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1["id"], 1);
        assert_eq!(calls[1].1["id"], 2);
        assert_eq!(calls[0].1["jsonrpc"], "2.0");
    }
}
