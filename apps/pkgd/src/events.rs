//! Event handling and progress display

use crate::logging::log_event_with_tracing;
use console::{style, Term};
use pkgd_events::{AppEvent, EventMessage, GeneralEvent, InteractionEvent, JobEvent, TaskEvent};
use pkgd_types::{InteractionId, InteractionRequest, TaskStatus};

/// Renders task progress on stderr and decides answers to interactions
pub struct EventHandler {
    term: Term,
    colors_enabled: bool,
    /// Print status lines; off in JSON mode so stdout stays parseable
    show_status: bool,
    /// Choice sent for every interaction that offers it
    answer: Option<String>,
}

impl EventHandler {
    pub fn new(colors_enabled: bool, show_status: bool, answer: Option<String>) -> Self {
        Self {
            term: Term::stderr(),
            colors_enabled,
            show_status,
            answer,
        }
    }

    /// Handle one incoming event
    ///
    /// Returns the reply to send when the event is a suspending
    /// interaction request.
    pub fn handle_event(&mut self, message: &EventMessage) -> Option<(InteractionId, String)> {
        log_event_with_tracing(message);

        match &message.event {
            AppEvent::Task(TaskEvent::Changed {
                task_id,
                kind,
                status,
                progress,
                message,
            }) => {
                let line = format!("[{task_id}] {kind} {status} {progress:>3}% {message}");
                match status {
                    TaskStatus::Failed => self.show_error(&line),
                    TaskStatus::Canceled | TaskStatus::AwaitingInteraction => {
                        self.show_warning(&line);
                    }
                    _ => self.show_status(&line),
                }
                None
            }
            AppEvent::Task(TaskEvent::ListChanged { .. }) => None,

            AppEvent::Interaction(InteractionEvent::Requested { request }) => {
                self.show_warning(&format!(
                    "[{}] {} ({})",
                    request.task_id,
                    request.message,
                    request.choices.join("/")
                ));
                if request.suspend {
                    Some((request.id, self.choose(request)))
                } else {
                    None
                }
            }
            AppEvent::Interaction(InteractionEvent::Resolved {
                task_id, choice, ..
            }) => {
                self.show_status(&format!("[{task_id}] answered {choice}"));
                None
            }
            AppEvent::Interaction(InteractionEvent::Expired { task_id, .. }) => {
                self.show_warning(&format!("[{task_id}] confirmation expired"));
                None
            }

            AppEvent::Job(JobEvent::Failed {
                job_id,
                operation,
                error,
            }) => {
                self.show_error(&format!("[{job_id}] {operation} failed: {error}"));
                None
            }
            AppEvent::Job(_) => None,

            AppEvent::General(GeneralEvent::Warning { message, .. }) => {
                self.show_warning(message);
                None
            }
            AppEvent::General(GeneralEvent::Error { message, .. }) => {
                self.show_error(message);
                None
            }
            AppEvent::General(GeneralEvent::ConfigurationUpdated { default_repo }) => {
                self.show_status(&format!("default repository is now {default_repo}"));
                None
            }
            AppEvent::General(_) => None,
        }
    }

    /// The configured answer when offered, otherwise the default choice
    fn choose(&self, request: &InteractionRequest) -> String {
        self.answer
            .as_deref()
            .filter(|answer| request.offers(answer))
            .or_else(|| request.default_choice())
            .unwrap_or_default()
            .to_string()
    }

    fn show_status(&self, message: &str) {
        if self.show_status {
            let _ = self.term.write_line(message);
        }
    }

    fn show_warning(&self, message: &str) {
        if !self.show_status {
            return;
        }
        if self.colors_enabled {
            let _ = self.term.write_line(&style(message).yellow().to_string());
        } else {
            let _ = self.term.write_line(message);
        }
    }

    fn show_error(&self, message: &str) {
        if !self.show_status {
            return;
        }
        if self.colors_enabled {
            let _ = self.term.write_line(&style(message).red().bold().to_string());
        } else {
            let _ = self.term.write_line(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgd_types::TaskId;

    fn request(suspend: bool) -> InteractionRequest {
        let request = InteractionRequest::new(TaskId::new(), "reinstall?", &["skip", "reinstall"]);
        if suspend {
            request
        } else {
            request.informational()
        }
    }

    fn requested(request: InteractionRequest) -> EventMessage {
        EventMessage::from_event(AppEvent::Interaction(InteractionEvent::Requested { request }))
    }

    #[test]
    fn offered_answer_is_used() {
        let mut handler = EventHandler::new(false, false, Some("reinstall".to_string()));
        let request = request(true);
        let id = request.id;
        assert_eq!(
            handler.handle_event(&requested(request)),
            Some((id, "reinstall".to_string()))
        );
    }

    #[test]
    fn unoffered_answer_falls_back_to_default() {
        let mut handler = EventHandler::new(false, false, Some("abort".to_string()));
        let request = request(true);
        let id = request.id;
        assert_eq!(
            handler.handle_event(&requested(request)),
            Some((id, "skip".to_string()))
        );
    }

    #[test]
    fn informational_requests_need_no_reply() {
        let mut handler = EventHandler::new(false, false, None);
        assert_eq!(handler.handle_event(&requested(request(false))), None);
    }
}
