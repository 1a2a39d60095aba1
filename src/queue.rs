//! Target declaration queue.
//!
//! A deploy script declares targets through a [`Declarer`]. Each target
//! future is spawned immediately so resolutions run concurrently, but the
//! [`DeclarationQueue`] hands declarations to the reconciler strictly in the
//! order they were declared, whatever order they finish in.
//!
//! A script failure travels through the same channel, so the reconciler sees
//! it only after every declaration made before it.

use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{DeclareError, DeployError, Result};
use crate::plugin::ProviderRef;

/// Creates a connected declarer and queue.
#[must_use]
pub fn channel() -> (Declarer, DeclarationQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let declarer = Declarer {
        inner: Arc::new(DeclarerInner {
            next_index: AtomicU64::new(0),
            sender,
        }),
    };
    let queue = DeclarationQueue {
        receiver,
        buffer: BTreeMap::new(),
        cursor: 0,
        failure: None,
    };
    (declarer, queue)
}

/// Handle used by a deploy script to declare targets.
///
/// Cheap to clone. The queue ends once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct Declarer {
    inner: Arc<DeclarerInner>,
}

#[derive(Debug)]
struct DeclarerInner {
    next_index: AtomicU64,
    sender: mpsc::UnboundedSender<Message>,
}

#[derive(Debug)]
enum Message {
    Declared(Declaration),
    Failed { declared: u64, error: DeployError },
}

impl Declarer {
    /// Declares a target for `provider` and returns its declaration index.
    ///
    /// The target future starts running right away on the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DeclareError::QueueClosed`] if the run is no longer
    /// accepting declarations.
    pub fn declare<F>(&self, provider: ProviderRef, target: F) -> Result<u64>
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        let index = self.inner.next_index.fetch_add(1, Ordering::SeqCst);
        debug!("Declared target #{index} for provider '{}'", provider.name);

        let declaration = Declaration {
            index,
            provider,
            handle: tokio::spawn(target),
        };
        self.inner
            .sender
            .send(Message::Declared(declaration))
            .map_err(|_| DeclareError::QueueClosed)?;
        Ok(index)
    }

    /// Reports that the script failed.
    ///
    /// The queue yields `error` once every earlier declaration has been
    /// handed out. Nothing happens if the queue is already gone.
    pub fn fail(&self, error: DeployError) {
        let declared = self.declared();
        debug!("Script failed after {declared} declaration(s)");
        if self.inner.sender.send(Message::Failed { declared, error }).is_err() {
            debug!("Declaration queue already closed, dropping script failure");
        }
    }

    /// Number of targets declared so far.
    #[must_use]
    pub fn declared(&self) -> u64 {
        self.inner.next_index.load(Ordering::SeqCst)
    }

    /// Declares an already known target.
    ///
    /// # Errors
    ///
    /// Returns [`DeclareError::QueueClosed`] if the run is no longer
    /// accepting declarations.
    pub fn declare_value(&self, provider: ProviderRef, target: Value) -> Result<u64> {
        self.declare(provider, async move { Ok(target) })
    }
}

/// A declared target whose resolution may still be running.
#[derive(Debug)]
pub struct Declaration {
    /// Declaration index.
    pub index: u64,
    /// Provider the target belongs to.
    pub provider: ProviderRef,
    handle: JoinHandle<Result<Value>>,
}

impl Declaration {
    /// Waits for the target to resolve.
    ///
    /// # Errors
    ///
    /// Returns [`DeclareError::TargetFailed`] if the target future failed and
    /// [`DeclareError::Aborted`] if its task panicked or was cancelled.
    pub async fn resolve(mut self) -> Result<Value> {
        match (&mut self.handle).await {
            Ok(Ok(target)) => Ok(target),
            Ok(Err(e)) => Err(DeclareError::TargetFailed {
                index: self.index,
                provider: self.provider.name.clone(),
                source: Box::new(e),
            }
            .into()),
            Err(e) => Err(DeployError::from(DeclareError::Aborted {
                index: self.index,
                provider: self.provider.name.clone(),
                message: e.to_string(),
            })),
        }
    }
}

impl Drop for Declaration {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Single consumer of declarations, yielding them in index order.
#[derive(Debug)]
pub struct DeclarationQueue {
    receiver: mpsc::UnboundedReceiver<Message>,
    /// Declarations received ahead of the cursor.
    buffer: BTreeMap<u64, Declaration>,
    /// Index of the next declaration to hand out.
    cursor: u64,
    /// Script failure, held back until the cursor reaches its declared count.
    failure: Option<(u64, DeployError)>,
}

impl DeclarationQueue {
    /// Returns the next declaration in index order.
    ///
    /// Returns `None` once every declarer is gone and every declaration has
    /// been handed out.
    ///
    /// # Errors
    ///
    /// Returns the script's error, reported through [`Declarer::fail`], once
    /// every declaration made before the failure has been handed out.
    /// Returns [`DeclareError::MissingDeclaration`] if the channel closed while
    /// a later index was buffered but the cursor's index never arrived.
    pub async fn next(&mut self) -> Result<Option<Declaration>> {
        loop {
            if let Some(declaration) = self.buffer.remove(&self.cursor) {
                self.cursor += 1;
                return Ok(Some(declaration));
            }
            if self.failure.as_ref().is_some_and(|(declared, _)| *declared <= self.cursor)
                && let Some((_, error)) = self.failure.take()
            {
                return Err(error);
            }

            match self.receiver.recv().await {
                Some(Message::Declared(declaration)) => {
                    self.buffer.insert(declaration.index, declaration);
                }
                Some(Message::Failed { declared, error }) => {
                    self.failure = Some((declared, error));
                }
                None => {
                    return match self.failure.take() {
                        Some((_, error)) => Err(error),
                        None if self.buffer.is_empty() => Ok(None),
                        None => Err(DeclareError::MissingDeclaration { index: self.cursor }.into()),
                    };
                }
            }
        }
    }

    /// Number of declarations handed out so far.
    #[must_use]
    pub const fn dispatched(&self) -> u64 {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::HookRef;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn web() -> ProviderRef {
        ProviderRef::new("web", HookRef::new("test:web"))
    }

    #[tokio::test]
    async fn test_declarations_come_out_in_declared_order() {
        let (declarer, mut queue) = channel();
        let (release_a, wait_a) = oneshot::channel::<()>();

        declarer
            .declare(web(), async move {
                wait_a.await.ok();
                Ok(json!({ "name": "a" }))
            })
            .expect("declare failed");
        declarer
            .declare_value(web(), json!({ "name": "b" }))
            .expect("declare failed");
        drop(declarer);

        let first = queue.next().await.expect("queue failed").expect("missing first");
        assert_eq!(first.index, 0);
        // B has long resolved; A is only released now.
        tokio::time::sleep(Duration::from_millis(10)).await;
        release_a.send(()).ok();
        assert_eq!(first.resolve().await.expect("resolve failed")["name"], "a");

        let second = queue.next().await.expect("queue failed").expect("missing second");
        assert_eq!(second.index, 1);
        assert_eq!(second.resolve().await.expect("resolve failed")["name"], "b");

        assert!(queue.next().await.expect("queue failed").is_none());
        assert_eq!(queue.dispatched(), 2);
    }

    #[tokio::test]
    async fn test_declarations_from_concurrent_tasks_are_dense() {
        let (declarer, mut queue) = channel();
        let mut tasks = Vec::new();
        for n in 0..8 {
            let declarer = declarer.clone();
            tasks.push(tokio::spawn(async move {
                declarer
                    .declare(web(), async move {
                        tokio::time::sleep(Duration::from_millis(8 - n)).await;
                        Ok(json!({ "name": n }))
                    })
                    .expect("declare failed")
            }));
        }
        drop(declarer);
        for task in tasks {
            task.await.expect("task panicked");
        }

        let mut seen = Vec::new();
        while let Some(declaration) = queue.next().await.expect("queue failed") {
            seen.push(declaration.index);
            declaration.resolve().await.expect("resolve failed");
        }
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failed_target_carries_index_and_provider() {
        let (declarer, mut queue) = channel();
        declarer
            .declare(web(), async { Err(DeployError::internal("lookup failed")) })
            .expect("declare failed");
        drop(declarer);

        let declaration = queue.next().await.expect("queue failed").expect("missing");
        let err = declaration.resolve().await.expect_err("should fail");
        assert!(matches!(
            err,
            DeployError::Declare(DeclareError::TargetFailed { index: 0, .. })
        ));
        assert!(err.to_string().contains("'web'"));
    }

    #[tokio::test]
    async fn test_declare_after_queue_dropped() {
        let (declarer, queue) = channel();
        drop(queue);
        let result = declarer.declare_value(web(), json!({}));
        assert!(matches!(
            result,
            Err(DeployError::Declare(DeclareError::QueueClosed))
        ));
    }

    #[tokio::test]
    async fn test_script_failure_follows_earlier_declarations() {
        let (declarer, mut queue) = channel();
        declarer
            .declare_value(web(), json!({ "name": "a" }))
            .expect("declare failed");
        declarer.fail(DeployError::internal("script failed"));
        // Declared after the failure, never handed out.
        declarer
            .declare_value(web(), json!({ "name": "b" }))
            .expect("declare failed");
        drop(declarer);

        let first = queue.next().await.expect("queue failed").expect("missing first");
        assert_eq!(first.index, 0);
        let err = queue.next().await.expect_err("script failure expected");
        assert!(matches!(err, DeployError::Internal(_)));
        assert_eq!(queue.dispatched(), 1);
    }

    #[tokio::test]
    async fn test_script_failure_waits_for_late_declaration() {
        let (declarer, mut queue) = channel();
        let index = declarer.inner.next_index.fetch_add(1, Ordering::SeqCst);
        declarer.fail(DeployError::internal("script failed"));
        declarer
            .inner
            .sender
            .send(Message::Declared(Declaration {
                index,
                provider: web(),
                handle: tokio::spawn(async { Ok(json!({ "name": "a" })) }),
            }))
            .expect("send failed");
        drop(declarer);

        let first = queue.next().await.expect("queue failed").expect("missing first");
        assert_eq!(first.index, 0);
        assert!(queue.next().await.is_err());
    }
}
