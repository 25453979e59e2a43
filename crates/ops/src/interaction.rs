//! Correlation of confirmation requests with caller replies

use crate::task::{TaskHandle, TaskRegistry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pkgd_errors::{Error, OpsError};
use pkgd_events::{AppEvent, EventEmitter, InteractionEvent};
use pkgd_types::{InteractionId, InteractionReply, InteractionRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct Outstanding {
    request: InteractionRequest,
    reply: oneshot::Sender<InteractionReply>,
}

/// Holds at most one outstanding request per interaction id
pub(crate) struct InteractionBroker {
    outstanding: DashMap<InteractionId, Outstanding>,
    registry: Arc<TaskRegistry>,
    default_timeout: Option<Duration>,
}

enum Resolution {
    Answered(InteractionReply),
    Canceled,
    Expired,
}

impl InteractionBroker {
    pub(crate) fn new(registry: Arc<TaskRegistry>, default_timeout: Option<Duration>) -> Self {
        Self {
            outstanding: DashMap::new(),
            registry,
            default_timeout,
        }
    }

    /// Ask the caller and suspend the step until answered
    ///
    /// Returns `Error::Cancelled` if the task is cancelled while waiting or
    /// the request's deadline passes; an expired request cancels its task.
    pub(crate) async fn raise(
        &self,
        task: &TaskHandle,
        mut request: InteractionRequest,
    ) -> Result<InteractionReply, Error> {
        request.task_id = task.id();

        if !request.suspend {
            let choice = request.default_choice().unwrap_or_default().to_string();
            task.progress(0, request.message.clone());
            self.registry.emit(AppEvent::Interaction(InteractionEvent::Requested {
                request: request.clone(),
            }));
            self.resolved(&request, &choice);
            return Ok(InteractionReply::new(choice));
        }

        task.checkpoint()?;
        if request.deadline.is_none() {
            if let Some(timeout) = self.default_timeout {
                let timeout = chrono::Duration::from_std(timeout)
                    .map_err(|e| Error::internal(format!("interaction timeout: {e}")))?;
                request.deadline = Some(Utc::now() + timeout);
            }
        }

        let id = request.id;
        let (tx, rx) = oneshot::channel();
        self.outstanding.insert(
            id,
            Outstanding {
                request: request.clone(),
                reply: tx,
            },
        );
        if let Err(e) = self.registry.await_interaction(task.id(), request.clone()) {
            self.outstanding.remove(&id);
            return Err(e);
        }
        tracing::info!(task_id = %task.id(), interaction_id = %id, "awaiting interaction");
        self.registry.emit(AppEvent::Interaction(InteractionEvent::Requested {
            request: request.clone(),
        }));

        let resolution = tokio::select! {
            reply = rx => match reply {
                Ok(reply) => Resolution::Answered(reply),
                Err(_) => Resolution::Canceled,
            },
            () = task.cancelled() => Resolution::Canceled,
            () = until(request.deadline) => Resolution::Expired,
        };
        self.outstanding.remove(&id);

        match resolution {
            Resolution::Answered(reply) => {
                self.registry.resume(task.id(), &reply.choice)?;
                self.resolved(&request, &reply.choice);
                Ok(reply)
            }
            Resolution::Canceled => Err(Error::Cancelled),
            Resolution::Expired => {
                tracing::warn!(task_id = %task.id(), interaction_id = %id, "interaction expired");
                self.registry.emit(AppEvent::Interaction(InteractionEvent::Expired {
                    interaction_id: id,
                    task_id: task.id(),
                }));
                self.registry.cancel(task.id())?;
                Err(Error::Cancelled)
            }
        }
    }

    /// Deliver the caller's answer
    ///
    /// # Errors
    ///
    /// `UnknownInteraction` if nothing with this id is outstanding,
    /// `InvalidChoice` if `reply` is not one of the offered choices; the
    /// request then stays outstanding.
    pub(crate) fn reply(&self, id: InteractionId, reply: InteractionReply) -> Result<(), Error> {
        let unknown = || -> Error {
            OpsError::UnknownInteraction {
                interaction_id: id.as_uuid(),
            }
            .into()
        };

        let accepted = self.outstanding.remove_if(&id, |_, outstanding| {
            outstanding.request.choices.is_empty() || outstanding.request.offers(&reply.choice)
        });
        let Some((_, outstanding)) = accepted else {
            if self.outstanding.contains_key(&id) {
                return Err(OpsError::InvalidChoice {
                    interaction_id: id.as_uuid(),
                    choice: reply.choice,
                }
                .into());
            }
            return Err(unknown());
        };

        outstanding.reply.send(reply).map_err(|_| unknown())
    }

    pub(crate) fn outstanding(&self) -> Vec<InteractionRequest> {
        let mut requests: Vec<InteractionRequest> = self
            .outstanding
            .iter()
            .map(|entry| entry.request.clone())
            .collect();
        requests.sort_by_key(|request| request.deadline);
        requests
    }

    fn resolved(&self, request: &InteractionRequest, choice: &str) {
        self.registry.emit(AppEvent::Interaction(InteractionEvent::Resolved {
            interaction_id: request.id,
            task_id: request.task_id,
            choice: choice.to_string(),
        }));
    }
}

async fn until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(deadline) => {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(remaining).await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgd_errors::ErrorKind;
    use pkgd_types::{Arch, Module, PackageReference, TaskKind, TaskStatus, TaskTarget, Version};

    fn running_task(registry: &Arc<TaskRegistry>, name: &str) -> TaskHandle {
        let target = TaskTarget::package(
            PackageReference::new("main", name, Version::new(1, 0, 0), Arch::X86_64),
            Module::BINARY,
        );
        let id = registry
            .claim(TaskKind::Install, target, None)
            .unwrap()
            .id();
        registry.start(id).unwrap()
    }

    async fn outstanding_for(broker: &InteractionBroker) -> InteractionRequest {
        for _ in 0..200 {
            if let Some(request) = broker.outstanding().into_iter().next() {
                return request;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("no interaction raised");
    }

    #[tokio::test]
    async fn test_reply_unblocks_raising_task() {
        let registry = Arc::new(TaskRegistry::new(None));
        let broker = Arc::new(InteractionBroker::new(Arc::clone(&registry), None));
        let task = running_task(&registry, "a");
        let task_id = task.id();

        let raised = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                let request =
                    InteractionRequest::new(task.id(), "reinstall?", &["skip", "reinstall"]);
                broker.raise(&task, request).await
            })
        };

        let request = outstanding_for(&broker).await;
        assert_eq!(request.task_id, task_id);
        let state = registry.snapshot(task_id).unwrap();
        assert_eq!(state.status, TaskStatus::AwaitingInteraction);
        assert_eq!(state.interaction.as_ref().map(|r| r.id), Some(request.id));

        broker
            .reply(request.id, InteractionReply::new("reinstall"))
            .unwrap();
        let reply = raised.await.unwrap().unwrap();
        assert!(reply.is("reinstall"));

        let state = registry.snapshot(task_id).unwrap();
        assert_eq!(state.status, TaskStatus::Running);
        assert!(state.interaction.is_none());

        // Exactly one reply is honoured
        let err = broker
            .reply(request.id, InteractionReply::new("skip"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownInteraction);
    }

    #[tokio::test]
    async fn test_unknown_interaction() {
        let registry = Arc::new(TaskRegistry::new(None));
        let broker = InteractionBroker::new(registry, None);
        let err = broker
            .reply(InteractionId::new(), InteractionReply::new("yes"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownInteraction);
    }

    #[tokio::test]
    async fn test_invalid_choice_keeps_request_outstanding() {
        let registry = Arc::new(TaskRegistry::new(None));
        let broker = Arc::new(InteractionBroker::new(Arc::clone(&registry), None));
        let task = running_task(&registry, "a");

        let raised = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                let request = InteractionRequest::new(task.id(), "continue?", &["yes", "no"]);
                broker.raise(&task, request).await
            })
        };

        let request = outstanding_for(&broker).await;
        let err = broker
            .reply(request.id, InteractionReply::new("maybe"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidChoice);
        assert_eq!(broker.outstanding().len(), 1);

        broker.reply(request.id, InteractionReply::new("no")).unwrap();
        assert!(raised.await.unwrap().unwrap().is("no"));
    }

    #[tokio::test]
    async fn test_cancel_discards_outstanding_request() {
        let registry = Arc::new(TaskRegistry::new(None));
        let broker = Arc::new(InteractionBroker::new(Arc::clone(&registry), None));
        let task = running_task(&registry, "a");
        let task_id = task.id();

        let raised = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                let request = InteractionRequest::new(task.id(), "continue?", &["yes", "no"]);
                broker.raise(&task, request).await
            })
        };

        let request = outstanding_for(&broker).await;
        registry.cancel(task_id).unwrap();

        let err = raised.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(broker.outstanding().is_empty());
        let err = broker
            .reply(request.id, InteractionReply::new("yes"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownInteraction);
    }

    #[tokio::test]
    async fn test_deadline_cancels_task() {
        let registry = Arc::new(TaskRegistry::new(None));
        let broker = InteractionBroker::new(Arc::clone(&registry), Some(Duration::from_millis(20)));
        let task = running_task(&registry, "a");

        let request = InteractionRequest::new(task.id(), "continue?", &["yes", "no"]);
        let err = broker.raise(&task, request).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(registry.snapshot(task.id()).unwrap().cancel_requested);
        assert!(broker.outstanding().is_empty());
    }

    #[tokio::test]
    async fn test_informational_request_resolves_with_default() {
        let registry = Arc::new(TaskRegistry::new(None));
        let broker = InteractionBroker::new(Arc::clone(&registry), None);
        let task = running_task(&registry, "a");

        let request =
            InteractionRequest::new(task.id(), "using cached metadata", &["ok"]).informational();
        let reply = broker.raise(&task, request).await.unwrap();
        assert!(reply.is("ok"));
        assert_eq!(
            registry.snapshot(task.id()).unwrap().status,
            TaskStatus::Running
        );
    }
}
