use crate::error::Result;
use crate::model::action::ActionPayload;

/// The live UI a replay is applied to.
#[async_trait::async_trait]
pub trait ReplayTarget: Send + Sync {
    async fn navigate(&self, path: &str) -> Result<()>;
    /// Apply any non-route action.
    async fn dispatch(&self, action: &ActionPayload) -> Result<()>;
}

/// Logs every step instead of driving a UI; used for dry runs.
pub struct TracingTarget;

#[async_trait::async_trait]
impl ReplayTarget for TracingTarget {
    async fn navigate(&self, path: &str) -> Result<()> {
        tracing::info!(path, "replay: navigate");
        Ok(())
    }

    async fn dispatch(&self, action: &ActionPayload) -> Result<()> {
        match action {
            ActionPayload::Route(r) => tracing::info!(path = %r.path, "replay: navigate"),
            ActionPayload::Command(c) => tracing::info!(name = %c.name, args = %c.args, "replay: command"),
            ActionPayload::Click(c) => tracing::info!(selector = %c.target, "replay: click"),
            ActionPayload::Submit(s) => {
                tracing::info!(form = %s.form, fields = s.values.len(), "replay: submit")
            }
        }
        Ok(())
    }
}
