//! Per-request context: ambient tenant and cancellation.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::errors::{GraphError, Result};

/// Carried by every public operation.
///
/// The tenant here is the *ambient* tenant (e.g. the caller's organisation);
/// an explicit tenant in an options struct always wins over it.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    tenant: Option<String>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// A context with no tenant and a fresh, never-cancelled token.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Bind the context to an externally owned token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref().filter(|t| !t.is_empty())
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast with [`GraphError::Cancelled`] if the token already fired.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(GraphError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run one upstream round-trip, aborting as soon as the token fires.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GraphError::Cancelled),
            out = fut => out,
        }
    }
}

/// Pick the tenant for one call: explicit option, then context, then the store default.
pub(crate) fn resolve_tenant(
    explicit: Option<&str>,
    ctx: &RequestContext,
    default: Option<&str>,
) -> Option<String> {
    explicit
        .filter(|t| !t.is_empty())
        .or_else(|| ctx.tenant())
        .or_else(|| default.filter(|t| !t.is_empty()))
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_tenant_wins() {
        let ctx = RequestContext::background().with_tenant("ctx-org");
        assert_eq!(
            resolve_tenant(Some("explicit"), &ctx, Some("default")).as_deref(),
            Some("explicit")
        );
    }

    #[test]
    fn context_tenant_beats_default() {
        let ctx = RequestContext::background().with_tenant("ctx-org");
        assert_eq!(resolve_tenant(None, &ctx, Some("default")).as_deref(), Some("ctx-org"));
    }

    #[test]
    fn empty_values_fall_through() {
        let ctx = RequestContext::background().with_tenant("");
        assert_eq!(resolve_tenant(Some(""), &ctx, Some("default")).as_deref(), Some("default"));
        assert_eq!(resolve_tenant(None, &RequestContext::background(), None), None);
    }

    #[tokio::test]
    async fn run_passes_through_when_not_cancelled() {
        let ctx = RequestContext::background();
        let out = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn run_refuses_to_start_after_cancel() {
        let token = CancellationToken::new();
        let ctx = RequestContext::background().with_cancellation(token.clone());
        token.cancel();
        let err = ctx.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }

    #[tokio::test]
    async fn run_aborts_a_pending_call() {
        let token = CancellationToken::new();
        let ctx = RequestContext::background().with_cancellation(token.clone());
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let err = ctx
            .run(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }
}
