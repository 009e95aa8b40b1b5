// 🔄 Auth-Refresh Policy - retry once after a bank-specific re-handshake
//
//   Idle → Requesting → Success
//                     → TransportFailed            (surfaced as-is)
//                     → AuthRejected → Refreshing → Requesting (once)
//                                                 → AuthRejected (terminal)
//
// The refresh procedure is supplied per bank; the retry logic lives only here.

use crate::error::AdapterResult;
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, info, warn};

/// Bank-specific re-handshake that restores server-side session state.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self) -> AdapterResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Requesting,
    Refreshing,
    Success,
    AuthRejected,
    TransportFailed,
}

pub struct AuthRefreshPolicy<R> {
    refresher: R,
}

impl<R: SessionRefresher> AuthRefreshPolicy<R> {
    pub fn new(refresher: R) -> Self {
        AuthRefreshPolicy { refresher }
    }

    pub fn refresher(&self) -> &R {
        &self.refresher
    }

    /// Run `call`; on an authorization failure, refresh and run it exactly once more.
    ///
    /// A failing refresh surfaces the refresh error. A second authorization
    /// failure is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> AdapterResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = AdapterResult<T>> + Send,
        T: Send,
    {
        let mut state = RefreshState::Idle;
        let mut refreshed = false;

        loop {
            state = transition(operation, state, RefreshState::Requesting);
            match call().await {
                Ok(value) => {
                    transition(operation, state, RefreshState::Success);
                    return Ok(value);
                }
                Err(err) if err.is_auth() => {
                    state = transition(operation, state, RefreshState::AuthRejected);
                    if refreshed {
                        warn!(operation, "authorization rejected again after refresh");
                        return Err(err);
                    }
                    state = transition(operation, state, RefreshState::Refreshing);
                    info!(operation, "authorization rejected, refreshing session");
                    self.refresher.refresh().await?;
                    refreshed = true;
                }
                Err(err) => {
                    transition(operation, state, RefreshState::TransportFailed);
                    return Err(err);
                }
            }
        }
    }
}

fn transition(operation: &str, from: RefreshState, to: RefreshState) -> RefreshState {
    debug!(operation, ?from, ?to, "auth-refresh transition");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::http::{HttpRequest, HttpResponse, Transport};
    use crate::testing::ScriptedTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct TwoStepHandshake {
        transport: Arc<ScriptedTransport>,
    }

    #[async_trait]
    impl SessionRefresher for TwoStepHandshake {
        async fn refresh(&self) -> AdapterResult<()> {
            self.transport
                .send(HttpRequest::get("https://bank.example/bootstrap"))
                .await?
                .ensure_success("bootstrap")?;
            self.transport
                .send(HttpRequest::get("https://bank.example/complete"))
                .await?
                .ensure_success("complete")?;
            Ok(())
        }
    }

    struct CountingRefresher(AtomicUsize);

    #[async_trait]
    impl SessionRefresher for CountingRefresher {
        async fn refresh(&self) -> AdapterResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn fetch(transport: &ScriptedTransport) -> AdapterResult<String> {
        let response = transport
            .send(HttpRequest::get("https://bank.example/data"))
            .await?
            .ensure_success("data")?;
        Ok(response.text())
    }

    #[tokio::test]
    async fn test_refresh_then_retry_succeeds_with_four_calls() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(HttpResponse::new(403, "forbidden"))
                .respond(HttpResponse::new(200, "<html>bootstrap</html>"))
                .respond(HttpResponse::new(200, "{}"))
                .respond(HttpResponse::new(200, "payload")),
        );
        let policy = AuthRefreshPolicy::new(TwoStepHandshake {
            transport: transport.clone(),
        });

        let result = policy.execute("data", || fetch(&transport)).await.unwrap();

        assert_eq!(result, "payload");
        assert_eq!(
            transport.urls(),
            vec![
                "https://bank.example/data",
                "https://bank.example/bootstrap",
                "https://bank.example/complete",
                "https://bank.example/data",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_rejection_is_terminal() {
        let transport = ScriptedTransport::new()
            .respond(HttpResponse::new(401, ""))
            .respond(HttpResponse::new(403, ""));
        let policy = AuthRefreshPolicy::new(CountingRefresher(AtomicUsize::new(0)));

        let err = policy.execute("data", || fetch(&transport)).await.unwrap_err();

        assert!(matches!(err, AdapterError::Authentication { status: 403, .. }));
        assert_eq!(policy.refresher().0.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_non_auth_failures_are_not_retried() {
        let transport = ScriptedTransport::new().respond(HttpResponse::new(500, "oops"));
        let policy = AuthRefreshPolicy::new(CountingRefresher(AtomicUsize::new(0)));

        let err = policy.execute("data", || fetch(&transport)).await.unwrap_err();

        assert!(matches!(err, AdapterError::Upstream { status: Some(500), .. }));
        assert_eq!(policy.refresher().0.load(Ordering::SeqCst), 0);

        let transport = ScriptedTransport::new().fail_network();
        let err = policy.execute("data", || fetch(&transport)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Network(_)));
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_refresh_error() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(HttpResponse::new(403, ""))
                .respond(HttpResponse::new(503, "down")),
        );
        let policy = AuthRefreshPolicy::new(TwoStepHandshake {
            transport: transport.clone(),
        });

        let err = policy.execute("data", || fetch(&transport)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Upstream { status: Some(503), .. }));
        assert_eq!(transport.calls().len(), 2);
    }
}
