//! Fire-and-forget broadcast dispatch
//!
//! Each broadcast runs as a detached tokio task. The caller never waits on
//! it and never sees its errors; failures are only logged. Tasks are kept in
//! a `JoinSet` so a shutting-down process can flush what is still in flight.

use super::notifier::Notifier;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Broadcaster {
    notifier: Arc<dyn Notifier>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Broadcaster {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    /// Queue a fixed text for broadcast
    pub fn send(&self, label: &'static str, text: impl Into<String>) {
        let text = text.into();
        self.dispatch(label, async move { Ok(Some(text)) });
    }

    /// Run `job` in the background and broadcast whatever text it produces.
    /// `Ok(None)` means there is nothing to send.
    pub fn dispatch<F>(&self, label: &'static str, job: F)
    where
        F: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        let notifier = self.notifier.clone();
        let task = async move {
            let text = match job.await {
                Ok(Some(text)) => text,
                Ok(None) => return,
                Err(e) => {
                    warn!("[Broadcast] {} aborted: {:#}", label, e);
                    return;
                }
            };
            match notifier.send_broadcast(&text).await {
                Ok(()) => debug!("[Broadcast] {} delivered", label),
                Err(e) => warn!("[Broadcast] {} failed: {:#}", label, e),
            }
        };

        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Reap finished tasks so a long-running server doesn't accumulate them
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Wait for every broadcast dispatched so far
    pub async fn flush(&self) {
        let mut pending = {
            let mut tasks = match self.tasks.lock() {
                Ok(tasks) => tasks,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *tasks)
        };
        while pending.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::testing::RecordingNotifier;

    #[tokio::test]
    async fn test_send_and_flush() {
        let notifier = RecordingNotifier::default();
        let broadcaster = Broadcaster::new(Arc::new(notifier.clone()));

        broadcaster.send("test", "hello");
        broadcaster.dispatch("job", async { Ok(Some("computed".to_string())) });
        broadcaster.dispatch("skip", async { Ok(None) });
        broadcaster.dispatch("fail", async { Err(anyhow::anyhow!("boom")) });
        broadcaster.flush().await;

        let mut sent = notifier.sent();
        sent.sort();
        assert_eq!(sent, vec!["computed", "hello"]);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        // ConsoleNotifier-like failure: membership lookup errors inside a job
        let notifier = RecordingNotifier::default();
        let broadcaster = Broadcaster::new(Arc::new(notifier.clone()));
        let lookup = broadcaster.notifier();
        broadcaster.dispatch("members", async move {
            let members = lookup.list_members().await?;
            Ok(Some(members.join(", ")))
        });
        broadcaster.flush().await;
        assert!(notifier.sent().is_empty());
    }
}
