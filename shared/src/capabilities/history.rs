use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Browser history updates. The core never reloads the page; it only
/// rewrites the hash so reloads and shared links land on the same screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryOperation {
    Push { path: String },
    Replace { path: String },
}

impl HistoryOperation {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Push { path } | Self::Replace { path } => path,
        }
    }
}

impl Operation for HistoryOperation {
    type Output = ();
}

#[derive(crux_core::macros::Capability)]
pub struct History<Ev> {
    context: CapabilityContext<HistoryOperation, Ev>,
}

impl<Ev> History<Ev> {
    pub fn new(context: CapabilityContext<HistoryOperation, Ev>) -> Self {
        Self { context }
    }
}

impl<Ev> History<Ev>
where
    Ev: Send + 'static,
{
    pub fn push(&self, path: impl Into<String>) {
        self.notify(HistoryOperation::Push { path: path.into() });
    }

    pub fn replace(&self, path: impl Into<String>) {
        self.notify(HistoryOperation::Replace { path: path.into() });
    }

    fn notify(&self, operation: HistoryOperation) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }
}
