use crate::analysis::AnalysisService;
use crate::batch::{BatchEvent, BatchOrchestrator, BatchReport};
use crate::capture::{CaptureEvent, CaptureManager, CaptureSource};
use crate::chat::{ChatBinder, ChatContext, ChatMessage, ChatService};
use crate::error::OrchestratorError;
use crate::history::ResultHistory;
use crate::media::VideoFile;
use crate::screen::{Screen, ScreenMachine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ScreenChanged(Screen),
    Batch(BatchEvent),
    Capture(CaptureEvent),
    SelectionChanged { index: usize, analysis_id: String },
    ChatReply(ChatMessage),
}

pub struct SessionServices {
    pub analysis: Arc<dyn AnalysisService>,
    pub chat: Arc<dyn ChatService>,
    pub capture: Arc<dyn CaptureSource>,
    pub request_timeout: Duration,
}

/// All state for one run of the assistant. Observers get every change on the
/// event channel.
pub struct Session {
    screen: ScreenMachine,
    history: ResultHistory,
    batch: BatchOrchestrator,
    chat: ChatBinder,
    capture: CaptureManager,
    selected_app: String,
    event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl Session {
    pub fn new(
        services: SessionServices,
        event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    ) -> Self {
        let capture_tx = event_tx.clone();
        let capture = CaptureManager::new(services.capture, move |event| {
            send_event(&capture_tx, SessionEvent::Capture(event));
        });

        Self {
            screen: ScreenMachine::new(),
            history: ResultHistory::new(),
            batch: BatchOrchestrator::new(services.analysis, services.request_timeout),
            chat: ChatBinder::new(services.chat, services.request_timeout),
            capture,
            selected_app: String::new(),
            event_tx,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen.current()
    }

    pub fn history(&self) -> &ResultHistory {
        &self.history
    }

    pub fn chat(&self) -> &ChatBinder {
        &self.chat
    }

    pub fn capture(&self) -> &CaptureManager {
        &self.capture
    }

    pub fn selected_app(&self) -> &str {
        &self.selected_app
    }

    pub fn set_selected_app(&mut self, app: impl Into<String>) {
        self.selected_app = app.into().trim().to_string();
    }

    /// Runs one batch from the upload screen. An empty queue does nothing.
    /// Successful results go to the front of the history and the screen
    /// moves to results, or back to upload if nothing succeeded.
    pub async fn submit(&mut self, files: Vec<VideoFile>) -> Result<BatchReport, OrchestratorError> {
        if files.is_empty() {
            return Ok(BatchReport::default());
        }

        let screen = self.screen.begin_batch()?;
        send_event(&self.event_tx, SessionEvent::ScreenChanged(screen));

        let event_tx = self.event_tx.clone();
        let known_ids = self.history.items().iter().map(|r| r.id.clone()).collect();
        let mut report = self
            .batch
            .run(files, known_ids, |event| {
                send_event(&event_tx, SessionEvent::Batch(event))
            })
            .await;

        let succeeded = report.succeeded();
        self.history.append_batch(std::mem::take(&mut report.results));
        // Callers still get the new block; it now sits at the front of history.
        report.results = self.history.items()[..succeeded].to_vec();

        let screen = self.screen.finish_batch(succeeded)?;
        send_event(&self.event_tx, SessionEvent::ScreenChanged(screen));
        if let Some(selected) = self.history.selected().filter(|_| succeeded > 0) {
            send_event(
                &self.event_tx,
                SessionEvent::SelectionChanged {
                    index: 0,
                    analysis_id: selected.id.clone(),
                },
            );
        }
        Ok(report)
    }

    /// Picks an older result. From the upload screen this jumps straight to
    /// the results view.
    pub fn select(&mut self, index: usize) -> Result<Screen, OrchestratorError> {
        let analysis_id = self.history.select(index)?.id.clone();
        send_event(
            &self.event_tx,
            SessionEvent::SelectionChanged { index, analysis_id },
        );

        let before = self.screen.current();
        let screen = self.screen.show_history_pick();
        if screen != before {
            send_event(&self.event_tx, SessionEvent::ScreenChanged(screen));
        }
        Ok(screen)
    }

    pub fn open_guide(&mut self) -> Result<Screen, OrchestratorError> {
        let screen = self.screen.open_guide()?;
        send_event(&self.event_tx, SessionEvent::ScreenChanged(screen));
        Ok(screen)
    }

    pub fn back_to_results(&mut self) -> Result<Screen, OrchestratorError> {
        let screen = self.screen.back_to_results()?;
        send_event(&self.event_tx, SessionEvent::ScreenChanged(screen));
        Ok(screen)
    }

    /// Back to upload. History, chat log and capture are left as they are.
    pub fn reset(&mut self) -> Screen {
        let screen = self.screen.reset();
        send_event(&self.event_tx, SessionEvent::ScreenChanged(screen));
        screen
    }

    pub async fn toggle_capture(&self) -> Result<bool, OrchestratorError> {
        self.capture.toggle().await
    }

    pub async fn chat_context(&self) -> ChatContext {
        ChatContext {
            analysis_summary: self.history.selected().map(|r| r.summary.raw().clone()),
            selected_app: self.selected_app.clone(),
            capture_active: self.capture.is_active().await,
        }
    }

    /// Sends with whatever result is selected right now. Blank text is a no-op.
    pub async fn send_chat(&self, text: &str) -> Option<ChatMessage> {
        let context = self.chat_context().await;
        let reply = self.chat.send(text, context).await?;
        send_event(&self.event_tx, SessionEvent::ChatReply(reply.clone()));
        Some(reply)
    }

    pub async fn shutdown(&self) {
        self.capture.stop().await;
    }
}

fn send_event(event_tx: &Option<mpsc::UnboundedSender<SessionEvent>>, event: SessionEvent) {
    if let Some(tx) = event_tx {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionEvent, SessionServices};
    use crate::analysis::{AnalysisService, AnalyzeResponse};
    use crate::batch::BatchEvent;
    use crate::capture::tests::FakeSource;
    use crate::chat::{ChatRequest, ChatService, Role};
    use crate::error::OrchestratorError;
    use crate::media::VideoFile;
    use crate::screen::Screen;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct FailNamed(Vec<&'static str>);

    #[async_trait]
    impl AnalysisService for FailNamed {
        async fn analyze(&self, file: &VideoFile) -> Result<AnalyzeResponse> {
            if self.0.contains(&file.name.as_str()) {
                bail!("analysis service error 500 Internal Server Error");
            }
            Ok(serde_json::from_value(json!({
                "analysis_id": format!("id-{}", file.name),
                "timestamp": "11:11:11",
                "summary": {"detected_language": "English", "duration": 75, "source": file.name},
                "suggestions": []
            }))?)
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatService for RecordingChat {
        async fn reply(&self, request: &ChatRequest) -> Result<String> {
            self.seen.lock().expect("seen lock").push(request.clone());
            Ok("try the razor tool".to_string())
        }
    }

    fn video(name: &str) -> VideoFile {
        VideoFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            declared_type: None,
            size_bytes: 1,
        }
    }

    struct Harness {
        session: Session,
        chat: Arc<RecordingChat>,
        capture: Arc<FakeSource>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    }

    fn harness(failing: Vec<&'static str>) -> Harness {
        let chat = Arc::new(RecordingChat::default());
        let capture = Arc::new(FakeSource::default());
        let (tx, events) = mpsc::unbounded_channel();
        let session = Session::new(
            SessionServices {
                analysis: Arc::new(FailNamed(failing)),
                chat: chat.clone(),
                capture: capture.clone(),
                request_timeout: Duration::from_secs(5),
            },
            Some(tx),
        );
        Harness {
            session,
            chat,
            capture,
            events,
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn history_ids(session: &Session) -> Vec<String> {
        session.history().items().iter().map(|r| r.id.clone()).collect()
    }

    #[tokio::test]
    async fn partial_failure_lands_on_results() {
        let mut h = harness(vec!["two.mp4"]);

        let report = h
            .session
            .submit(vec![video("one.mp4"), video("two.mp4"), video("three.mp4")])
            .await
            .expect("submit");

        assert_eq!(report.succeeded(), 2);
        assert_eq!(history_ids(&h.session), vec!["id-one.mp4", "id-three.mp4"]);
        assert_eq!(h.session.screen(), Screen::Results);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Batch(BatchEvent::Failed { name, .. }) if name == "two.mp4"
        )));
        assert!(matches!(events.first(), Some(SessionEvent::ScreenChanged(Screen::Loading))));
    }

    #[tokio::test]
    async fn multi_file_batch_reports_every_new_result() {
        let mut h = harness(Vec::new());
        h.session.submit(vec![video("old.mp4")]).await.expect("first batch");
        h.session.reset();

        let report = h
            .session
            .submit(vec![video("a.mp4"), video("b.mp4"), video("c.mp4")])
            .await
            .expect("second batch");

        let latest: Vec<_> = h.session.history().latest_batch().iter().map(|r| r.id.clone()).collect();
        assert_eq!(latest, vec!["id-a.mp4", "id-b.mp4", "id-c.mp4"]);
        let reported: Vec<_> = report.results.iter().map(|r| r.id.clone()).collect();
        assert_eq!(reported, latest);
    }

    #[tokio::test]
    async fn duplicate_ids_never_reach_history() {
        let mut h = harness(Vec::new());
        h.session.submit(vec![video("a.mp4")]).await.expect("first batch");
        h.session.reset();

        // Same name, same id from the service: already in history.
        let report = h
            .session
            .submit(vec![video("a.mp4"), video("b.mp4"), video("b.mp4")])
            .await
            .expect("second batch");

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(history_ids(&h.session), vec!["id-b.mp4", "id-a.mp4"]);
        let failed = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Batch(BatchEvent::Failed { .. })))
            .count();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn total_failure_returns_to_upload() {
        let mut h = harness(vec!["only.mp4"]);

        let report = h.session.submit(vec![video("only.mp4")]).await.expect("submit");
        assert_eq!(report.succeeded(), 0);
        assert!(h.session.history().is_empty());
        assert_eq!(h.session.screen(), Screen::Upload);
    }

    #[tokio::test]
    async fn new_batch_goes_first_and_is_selected() {
        let mut h = harness(Vec::new());
        h.session
            .submit(vec![video("a.mp4"), video("b.mp4")])
            .await
            .expect("first batch");
        h.session.reset();
        h.session
            .submit(vec![video("c.mp4"), video("d.mp4")])
            .await
            .expect("second batch");

        assert_eq!(
            history_ids(&h.session),
            vec!["id-c.mp4", "id-d.mp4", "id-a.mp4", "id-b.mp4"]
        );
        assert_eq!(h.session.history().selected_index(), Some(0));
    }

    #[tokio::test]
    async fn submit_outside_upload_is_rejected() {
        let mut h = harness(Vec::new());
        h.session.submit(vec![video("a.mp4")]).await.expect("submit");

        let err = h
            .session
            .submit(vec![video("b.mp4")])
            .await
            .expect_err("results screen");
        assert!(matches!(err, OrchestratorError::IllegalTransition { .. }));
        assert_eq!(h.session.history().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let mut h = harness(Vec::new());
        let report = h.session.submit(Vec::new()).await.expect("submit");
        assert_eq!(report.succeeded(), 0);
        assert_eq!(h.session.screen(), Screen::Upload);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn picking_history_from_upload_jumps_to_results() {
        let mut h = harness(Vec::new());
        h.session
            .submit(vec![video("a.mp4"), video("b.mp4")])
            .await
            .expect("submit");
        assert_eq!(h.session.reset(), Screen::Upload);
        assert_eq!(h.session.history().len(), 2);

        assert_eq!(h.session.select(1).expect("select"), Screen::Results);
        assert_eq!(
            h.session.history().selected().map(|r| r.id.as_str()),
            Some("id-b.mp4")
        );

        let err = h.session.select(5).expect_err("out of range");
        assert_eq!(err, OrchestratorError::SelectionOutOfRange { index: 5, len: 2 });
        assert_eq!(h.session.history().selected_index(), Some(1));
    }

    #[tokio::test]
    async fn chat_carries_selected_summary_app_and_capture_flag() {
        let mut h = harness(Vec::new());
        h.session
            .submit(vec![video("a.mp4"), video("b.mp4")])
            .await
            .expect("submit");
        h.session.open_guide().expect("guide");
        h.session.set_selected_app("DaVinci Resolve");
        assert!(h.session.toggle_capture().await.expect("share"));

        h.session.send_chat("how do I trim?").await.expect("reply");
        h.session.select(1).expect("select b");
        assert!(!h.session.toggle_capture().await.expect("unshare"));
        h.session.send_chat("and now?").await.expect("reply");

        let seen = h.chat.seen.lock().expect("seen");
        assert_eq!(seen[0].analysis_summary.as_ref().map(|s| s["source"].clone()), Some(json!("a.mp4")));
        assert_eq!(seen[0].selected_app, "DaVinci Resolve");
        assert!(seen[0].is_sharing);
        assert_eq!(seen[1].analysis_summary.as_ref().map(|s| s["source"].clone()), Some(json!("b.mp4")));
        assert!(!seen[1].is_sharing);

        let log = h.session.chat().messages();
        assert_eq!(log.len(), 4);
        assert_eq!(log[2].role, Role::User);
        assert_eq!(log[2].text, "and now?");
        assert_eq!(h.session.screen(), Screen::Guide);
    }

    #[tokio::test]
    async fn chat_without_results_sends_null_summary() {
        let h = harness(Vec::new());
        assert!(h.session.send_chat("   ").await.is_none());
        h.session.send_chat("hi").await.expect("reply");

        let seen = h.chat.seen.lock().expect("seen");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].analysis_summary.is_none());
    }

    #[tokio::test]
    async fn capture_events_reach_observers_and_shutdown_releases() {
        let mut h = harness(Vec::new());
        h.session.toggle_capture().await.expect("share");
        h.session.shutdown().await;

        assert!(!h.session.capture().is_active().await);
        assert_eq!(
            h.capture.stopped.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        let captures: Vec<_> = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Capture(_)))
            .collect();
        assert_eq!(captures.len(), 2);
    }
}
