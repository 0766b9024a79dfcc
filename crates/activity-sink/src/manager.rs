//! Thread-aware wrapper over an [`ActivitySink`].
//!
//! Activity logs group into threads on the consumer side: an application
//! thread titled "Company - Job Title" while a bot works one posting, or a
//! general thread for everything else. The manager keeps the current thread
//! so individual call sites don't have to.

use std::sync::Arc;

use parking_lot::RwLock;

use huntr_core_types::{BotId, BotStatus};

use crate::message::{ActivityKind, SinkMessage};
use crate::sink::ActivitySink;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadType {
    Application,
    General,
}

#[derive(Debug)]
struct ThreadState {
    title: Option<String>,
    kind: ThreadType,
    status: Option<String>,
}

pub struct ActivityManager {
    sink: Arc<dyn ActivitySink>,
    bot_id: Option<BotId>,
    thread: RwLock<ThreadState>,
}

impl ActivityManager {
    pub fn new(sink: Arc<dyn ActivitySink>, bot_id: Option<BotId>) -> Self {
        Self {
            sink,
            bot_id,
            thread: RwLock::new(ThreadState {
                title: None,
                kind: ThreadType::General,
                status: None,
            }),
        }
    }

    /// Open an application thread for one job posting.
    pub fn start_application_thread(&self, company: &str, job_title: &str, status: &str) {
        let mut thread = self.thread.write();
        thread.title = Some(format!("{company} - {job_title}"));
        thread.kind = ThreadType::Application;
        thread.status = Some(status.to_string());
    }

    /// Update the status of the current application thread. No-op for
    /// general threads.
    pub fn update_application_status(&self, status: &str) {
        let mut thread = self.thread.write();
        if thread.kind == ThreadType::Application {
            thread.status = Some(status.to_string());
        }
    }

    /// Switch to a general thread; `None` clears the title entirely.
    pub fn start_general_thread(&self, title: Option<&str>) {
        let mut thread = self.thread.write();
        thread.title = title.map(str::to_string);
        thread.kind = ThreadType::General;
        thread.status = None;
    }

    pub fn current_thread_title(&self) -> Option<String> {
        self.thread.read().title.clone()
    }

    /// Send an activity message on the current thread. An explicit
    /// `thread_title` overrides the current one for this message only.
    pub async fn send_activity(
        &self,
        message: &str,
        kind: ActivityKind,
        thread_title: Option<&str>,
    ) {
        let (title, status) = {
            let thread = self.thread.read();
            (
                thread_title
                    .map(str::to_string)
                    .or_else(|| thread.title.clone()),
                thread.status.clone(),
            )
        };
        let mut msg = SinkMessage::activity(message, kind).with_thread(title, status);
        if let Some(id) = &self.bot_id {
            msg = msg.with_bot_id(id.clone());
        }
        self.sink.send(msg).await;
    }

    pub async fn send_status(&self, status: BotStatus, message: &str) {
        let mut msg = SinkMessage::status(status, message);
        if let Some(id) = &self.bot_id {
            msg = msg.with_bot_id(id.clone());
        }
        self.sink.send(msg).await;
    }
}

/// The manager is itself a sink: messages pass through with the bot id and
/// current thread attached, so it can sit directly behind an executor.
#[async_trait::async_trait]
impl ActivitySink for ActivityManager {
    async fn send(&self, message: SinkMessage) {
        let mut message = message;
        if let Some(id) = &self.bot_id {
            message = message.with_bot_id(id.clone());
        }
        if let SinkMessage::Activity {
            thread_title: None, ..
        } = &message
        {
            let (title, status) = {
                let thread = self.thread.read();
                (thread.title.clone(), thread.status.clone())
            };
            message = message.with_thread(title, status);
        }
        self.sink.send(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferedSink;
    use huntr_core_types::WorkflowRunId;

    fn manager_with_buffer() -> (ActivityManager, Arc<BufferedSink>) {
        let sink = BufferedSink::new();
        let bot_id = BotId::generate("indeed", &WorkflowRunId::from("r1"));
        let manager = ActivityManager::new(sink.clone(), Some(bot_id));
        (manager, sink)
    }

    #[tokio::test]
    async fn application_thread_title_flows_into_messages() {
        let (manager, sink) = manager_with_buffer();
        manager.start_application_thread("Acme", "Rust Engineer", "Started");
        manager
            .send_activity("Filling application form", ActivityKind::Action, None)
            .await;

        let msgs = sink.drain();
        match &msgs[0] {
            SinkMessage::Activity {
                thread_title,
                thread_status,
                bot_id,
                ..
            } => {
                assert_eq!(thread_title.as_deref(), Some("Acme - Rust Engineer"));
                assert_eq!(thread_status.as_deref(), Some("Started"));
                assert!(bot_id.is_some());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_update_ignored_for_general_thread() {
        let (manager, _sink) = manager_with_buffer();
        manager.start_general_thread(Some("Search"));
        manager.update_application_status("Applied");
        assert_eq!(manager.current_thread_title().as_deref(), Some("Search"));
        // General threads never carry a status.
        let thread = manager.thread.read();
        assert!(thread.status.is_none());
    }

    #[tokio::test]
    async fn explicit_title_overrides_current_thread() {
        let (manager, sink) = manager_with_buffer();
        manager.start_general_thread(Some("Search"));
        manager
            .send_activity("one-off", ActivityKind::Result, Some("Other"))
            .await;
        match &sink.drain()[0] {
            SinkMessage::Activity { thread_title, .. } => {
                assert_eq!(thread_title.as_deref(), Some("Other"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
