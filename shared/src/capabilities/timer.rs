use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One-shot timer. The shell answers once the delay has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerOperation {
    NotifyAfter { millis: u64 },
}

impl TimerOperation {
    #[must_use]
    pub fn after(delay: Duration) -> Self {
        Self::NotifyAfter {
            millis: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub const fn millis(&self) -> u64 {
        match self {
            Self::NotifyAfter { millis } => *millis,
        }
    }
}

impl Operation for TimerOperation {
    type Output = ();
}

#[derive(crux_core::macros::Capability)]
pub struct Timer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Timer<Ev> {
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }
}

impl<Ev> Timer<Ev>
where
    Ev: Send + 'static,
{
    /// Sends `event` back into the app once `delay` has passed.
    pub fn notify_after(&self, delay: Duration, event: Ev) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.request_from_shell(TimerOperation::after(delay)).await;
            ctx.update_app(event);
        });
    }
}
