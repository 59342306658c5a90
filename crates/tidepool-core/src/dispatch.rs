//! Hands intents to a provider and reports completions back

use crate::manager::{Completion, Intent};
use std::sync::Arc;
use std::time::Duration;
use tidepool_cloud::DropletProvider;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs provider operations off the caller's task
///
/// Every dispatched intent produces exactly one [`Completion`] on the
/// channel returned by [`Dispatcher::new`], including timeouts.
#[derive(Clone)]
pub struct Dispatcher {
    provider: Arc<dyn DropletProvider>,
    tx: mpsc::UnboundedSender<Completion>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn DropletProvider>,
        timeout: Option<Duration>,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                provider,
                tx,
                timeout,
            },
            rx,
        )
    }

    pub fn provider(&self) -> &Arc<dyn DropletProvider> {
        &self.provider
    }

    /// Spawn the provider call for `intent`
    pub fn dispatch(&self, intent: Intent) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let completion = this.execute(&intent).await;
            if this.tx.send(completion).is_err() {
                tracing::warn!(token = %intent.token, "Completion receiver dropped");
            }
        })
    }

    /// Run `intent` on the current task and return its completion
    pub async fn execute(&self, intent: &Intent) -> Completion {
        tracing::debug!(
            provider = self.provider.name(),
            token = %intent.token,
            "Running {}",
            intent.operation
        );

        let call = intent.operation.run(self.provider.as_ref());
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!(
                    "{} timed out after {}s",
                    intent.operation,
                    limit.as_secs()
                )),
            },
            None => call.await.map_err(|e| e.to_string()),
        };

        if let Err(message) = &result {
            tracing::error!(token = %intent.token, "Provider call failed: {}", message);
        }

        intent.complete(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::state::OperationToken;
    use tidepool_cloud::{
        CreateDropletRequest, ProviderOperation, ProviderReceipt, SimulatedCall,
        SimulatedProvider,
    };
    use uuid::Uuid;

    fn create_intent() -> Intent {
        Intent {
            token: OperationToken::new(),
            droplet_id: Uuid::new_v4(),
            kind: CommandKind::Create,
            operation: ProviderOperation::Create(CreateDropletRequest {
                name: "web-1".to_string(),
                region: "ams3".to_string(),
                image: "debian-12-x64".to_string(),
                size: "s-1vcpu-1gb".to_string(),
                ssh_key: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_dispatch_sends_completion() {
        let provider = Arc::new(SimulatedProvider::new());
        let (dispatcher, mut rx) = Dispatcher::new(provider, None);
        let intent = create_intent();

        dispatcher.dispatch(intent.clone()).await.unwrap();
        let completion = rx.recv().await.unwrap();

        assert_eq!(completion.token, intent.token);
        assert!(matches!(
            completion.result,
            Ok(ProviderReceipt::Created { .. })
        ));
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failed_completion() {
        let provider = Arc::new(SimulatedProvider::new());
        provider.fail_next(SimulatedCall::Create).await;
        let (dispatcher, _rx) = Dispatcher::new(provider, Some(Duration::from_secs(5)));

        let completion = dispatcher.execute(&create_intent()).await;
        assert!(completion.result.is_err());
    }
}
