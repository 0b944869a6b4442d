//! The bot's conversation: `/start`, link handling, the quality prompt, and
//! delivering the converted audio.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    async_trait::async_trait,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    tunegrab_common::types::{ChoiceResponse, MessageRef, PromptId, SessionKey},
    tunegrab_config::Messages,
    tunegrab_media::{AudioSource, VideoInfo, VideoLink, formats},
    tunegrab_routing::{
        CANCEL_CHOICE, ChoiceButton, ChoiceCoordinator, DeadlineRunner, Error as RoutingError,
        Notifier, Request, UpdateHandler,
    },
    tunegrab_sessions::EvictionListener,
};

const COMMAND_START: &str = "start";
const CANCEL_LABEL: &str = "Cancel";

/// Conversation failures that have a dedicated message for the user.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("unknown command /{0}")]
    UnknownCommand(String),
    #[error("not a video link")]
    InvalidLink,
    #[error("a previous choice is still pending")]
    MakeChoice,
    #[error("no known audio format for this video")]
    NoFormat,
}

/// Handles every request the router dispatches.
pub struct ConversationHandler {
    notifier: Arc<dyn Notifier>,
    source: Arc<dyn AudioSource>,
    coordinator: Arc<ChoiceCoordinator>,
    runner: DeadlineRunner,
    messages: Messages,
    choice_wait: Duration,
    max_duration: Duration,
    cancel: CancellationToken,
}

impl ConversationHandler {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        source: Arc<dyn AudioSource>,
        coordinator: Arc<ChoiceCoordinator>,
        messages: Messages,
    ) -> Self {
        Self {
            notifier,
            source,
            coordinator,
            runner: DeadlineRunner::new(Duration::from_secs(10)),
            messages,
            choice_wait: Duration::from_secs(10),
            max_duration: Duration::from_secs(10 * 60),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_choice_wait(mut self, wait: Duration) -> Self {
        self.choice_wait = wait;
        self
    }

    /// Deadline for probing a video and, separately, for downloading it.
    #[must_use]
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.runner = DeadlineRunner::new(timeout);
        self
    }

    #[must_use]
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Abort pending choices and downloads when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Message shown to the user for a failed request.
    pub fn user_message(&self, error: &anyhow::Error) -> &str {
        match error.downcast_ref::<FlowError>() {
            Some(FlowError::UnknownCommand(_)) => &self.messages.unknown_command,
            Some(FlowError::InvalidLink) => &self.messages.invalid_link,
            Some(FlowError::MakeChoice) => &self.messages.make_choice,
            Some(FlowError::NoFormat) => &self.messages.no_format,
            None => &self.messages.internal,
        }
    }

    async fn handle_command(&self, session: SessionKey, name: &str) -> Result<()> {
        match name {
            COMMAND_START => {
                self.notifier.send_text(session, &self.messages.start).await?;
                Ok(())
            },
            other => Err(FlowError::UnknownCommand(other.to_string()).into()),
        }
    }

    async fn handle_link(&self, session: SessionKey, text: &str, message: MessageRef) -> Result<()> {
        let link = VideoLink::parse(text).map_err(|_| FlowError::InvalidLink)?;
        if self.coordinator.is_waiting(session) {
            return Err(FlowError::MakeChoice.into());
        }

        let Some(info) = self.probe(session, &link).await? else {
            return Ok(());
        };
        info.ensure_duration_within(self.max_duration)?;
        let available = formats::available(&info.itags);
        debug!(%session, video = %info.id, itags = ?info.itags, "available itags");
        if available.is_empty() {
            return Err(FlowError::NoFormat.into());
        }

        let mut buttons: Vec<ChoiceButton> = available
            .iter()
            .map(|f| ChoiceButton::new(f.label, f.itag.to_string()))
            .collect();
        buttons.push(ChoiceButton::new(CANCEL_LABEL, CANCEL_CHOICE));

        // Claimed before the prompt goes out so an immediate press is queued.
        let pending = match self.coordinator.begin(session) {
            Ok(pending) => pending,
            Err(RoutingError::SessionBusy { .. }) => return Err(FlowError::MakeChoice.into()),
            Err(e) => return Err(e.into()),
        };
        let prompt = self
            .notifier
            .send_choices(session, &self.messages.quality, Some(message), &buttons)
            .await?;

        let choice = self
            .coordinator
            .wait_for(pending, prompt, self.choice_wait, &self.cancel)
            .await;
        match choice {
            Ok(value) if value == CANCEL_CHOICE => {
                info!(%session, %prompt, "choice canceled by user");
                self.notifier
                    .edit_text(session, prompt, &self.messages.cancel)
                    .await
            },
            Ok(value) => {
                let itag = formats::parse_itag(&value)?;
                self.download(session, link, prompt, itag).await
            },
            Err(e) if e.is_timeout() => {
                self.notifier
                    .edit_text(session, prompt, &self.messages.no_choice)
                    .await
            },
            Err(e) if e.is_canceled() => {
                debug!(%session, %prompt, "choice abandoned");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Probe under the same deadline as a download. `None` when the probe
    /// timed out (the user has been told) or was canceled.
    async fn probe(&self, session: SessionKey, link: &VideoLink) -> Result<Option<VideoInfo>> {
        let source = Arc::clone(&self.source);
        let link = link.clone();
        let outcome = self
            .runner
            .run(&self.cancel, move |token| async move {
                source.probe(&link, token).await
            })
            .await;

        match outcome {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_timeout() => {
                info!(%session, "video probe timed out");
                self.notifier.send_text(session, &self.messages.timeout).await?;
                Ok(None)
            },
            Err(e) if e.is_canceled() => {
                debug!(%session, "video probe abandoned");
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn download(
        &self,
        session: SessionKey,
        link: VideoLink,
        prompt: PromptId,
        itag: u32,
    ) -> Result<()> {
        self.notifier
            .edit_text(session, prompt, &self.messages.download)
            .await?;

        let source = Arc::clone(&self.source);
        let outcome = self
            .runner
            .run(&self.cancel, move |token| async move {
                source.fetch(&link, itag, token).await
            })
            .await;

        match outcome {
            Ok(audio) => {
                info!(%session, file_name = %audio.file_name, "audio ready, sending");
                self.notifier
                    .edit_text(session, prompt, &self.messages.send)
                    .await?;
                self.notifier
                    .send_file(session, Some(prompt), audio.bytes, &audio.file_name)
                    .await?;
                Ok(())
            },
            Err(e) if e.is_timeout() => {
                self.notifier
                    .edit_text(session, prompt, &self.messages.timeout)
                    .await
            },
            Err(e) if e.is_canceled() => {
                debug!(%session, %prompt, "download abandoned");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl UpdateHandler for ConversationHandler {
    async fn handle(&self, session: SessionKey, request: Request) -> Result<()> {
        match request {
            Request::Command { name, .. } => self.handle_command(session, &name).await,
            Request::Text { text, message } => self.handle_link(session, &text, message).await,
        }
    }

    async fn report_error(&self, session: SessionKey, error: &anyhow::Error) {
        let text = self.user_message(error);
        if let Err(e) = self.notifier.send_text(session, text).await {
            warn!(%session, error = %e, "failed to report error to user");
        }
    }

    async fn response_dropped(&self, session: SessionKey, response: ChoiceResponse) {
        if let Some(ack_id) = &response.ack_id
            && let Err(e) = self.notifier.acknowledge(ack_id).await
        {
            debug!(%session, error = %e, "failed to acknowledge dropped press");
        }
    }
}

/// Tells a chat its session was evicted for inactivity.
pub struct ExpiryNotice {
    notifier: Arc<dyn Notifier>,
    text: String,
}

impl ExpiryNotice {
    /// `None` when the catalog has no expiry message.
    pub fn from_messages(notifier: Arc<dyn Notifier>, messages: &Messages) -> Option<Self> {
        let text = messages.session_expired.clone()?;
        Some(Self { notifier, text })
    }
}

#[async_trait]
impl EvictionListener for ExpiryNotice {
    async fn session_evicted(&self, session: SessionKey) -> Result<()> {
        self.notifier.send_text(session, &self.text).await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{
            Mutex,
            atomic::{AtomicI32, Ordering},
        },
        tokio::time::Instant,
        tunegrab_media::AudioFile,
        tunegrab_sessions::SessionRegistry,
    };

    const A: SessionKey = SessionKey(42);
    const LINK_MESSAGE: MessageRef = MessageRef(5);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Text(String),
        Choices {
            id: MessageRef,
            reply_to: Option<MessageRef>,
            values: Vec<String>,
        },
        Edit(MessageRef, String),
        Strip(MessageRef),
        File(Option<MessageRef>, String),
        Ack(String),
    }

    /// Press delivered for a prompt the moment it is sent.
    struct InstantPress {
        registry: Arc<SessionRegistry>,
        value: String,
        delivery: Option<&'static str>,
    }

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<Call>>,
        next_id: AtomicI32,
        instant_press: Mutex<Option<InstantPress>>,
    }

    impl RecordingNotifier {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Text(t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        fn edits(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Edit(_, t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        fn next_id(&self) -> MessageRef {
            MessageRef(100 + self.next_id.fetch_add(1, Ordering::Relaxed))
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn press_on_send(&self, registry: Arc<SessionRegistry>, value: &str) {
            *self.instant_press.lock().unwrap() = Some(InstantPress {
                registry,
                value: value.to_string(),
                delivery: None,
            });
        }

        fn instant_press_delivery(&self) -> Option<&'static str> {
            self.instant_press.lock().unwrap().as_ref().and_then(|p| p.delivery)
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, _: SessionKey, text: &str) -> Result<MessageRef> {
            self.push(Call::Text(text.to_string()));
            Ok(self.next_id())
        }

        async fn send_choices(
            &self,
            session: SessionKey,
            _text: &str,
            reply_to: Option<MessageRef>,
            choices: &[ChoiceButton],
        ) -> Result<MessageRef> {
            let id = self.next_id();
            self.push(Call::Choices {
                id,
                reply_to,
                values: choices.iter().map(|c| c.value.clone()).collect(),
            });
            if let Some(press) = self.instant_press.lock().unwrap().as_mut() {
                let response = ChoiceResponse::new(id, press.value.clone());
                press.delivery = Some(press.registry.deliver(session, response).label());
            }
            Ok(id)
        }

        async fn edit_text(&self, _: SessionKey, message: MessageRef, text: &str) -> Result<()> {
            self.push(Call::Edit(message, text.to_string()));
            Ok(())
        }

        async fn strip_controls(&self, _: SessionKey, message: MessageRef) -> Result<()> {
            self.push(Call::Strip(message));
            Ok(())
        }

        async fn send_file(
            &self,
            _: SessionKey,
            reply_to: Option<MessageRef>,
            _bytes: Vec<u8>,
            file_name: &str,
        ) -> Result<MessageRef> {
            self.push(Call::File(reply_to, file_name.to_string()));
            Ok(self.next_id())
        }

        async fn acknowledge(&self, ack_id: &str) -> Result<()> {
            self.push(Call::Ack(ack_id.to_string()));
            Ok(())
        }
    }

    struct FakeSource {
        itags: Vec<u32>,
        duration: Duration,
        probe_delay: Duration,
        fetch_delay: Duration,
        fail: bool,
    }

    impl Default for FakeSource {
        fn default() -> Self {
            Self {
                itags: vec![18, 140, 139, 251],
                duration: Duration::from_secs(200),
                probe_delay: Duration::ZERO,
                fetch_delay: Duration::from_secs(3),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl AudioSource for FakeSource {
        async fn probe(&self, _: &VideoLink, _: CancellationToken) -> Result<VideoInfo> {
            if !self.probe_delay.is_zero() {
                tokio::time::sleep(self.probe_delay).await;
            }
            Ok(VideoInfo {
                id: "abc".into(),
                title: "Song".into(),
                duration: self.duration,
                itags: self.itags.clone(),
            })
        }

        async fn fetch(&self, _: &VideoLink, itag: u32, _: CancellationToken) -> Result<AudioFile> {
            tokio::time::sleep(self.fetch_delay).await;
            if self.fail {
                anyhow::bail!("yt-dlp exited with 1");
            }
            Ok(AudioFile {
                file_name: format!("Song-{itag}.mp3"),
                bytes: b"ID3".to_vec(),
            })
        }
    }

    struct Harness {
        registry: Arc<SessionRegistry>,
        notifier: Arc<RecordingNotifier>,
        handler: Arc<ConversationHandler>,
        messages: Messages,
    }

    fn harness(source: FakeSource) -> Harness {
        let registry = Arc::new(SessionRegistry::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = Arc::new(ChoiceCoordinator::new(
            Arc::clone(&registry),
            notifier.clone(),
        ));
        let messages = Messages::default();
        let handler = Arc::new(
            ConversationHandler::new(
                notifier.clone(),
                Arc::new(source),
                coordinator,
                messages.clone(),
            )
            .with_choice_wait(Duration::from_secs(10))
            .with_download_timeout(Duration::from_secs(10)),
        );
        Harness {
            registry,
            notifier,
            handler,
            messages,
        }
    }

    fn link_request() -> Request {
        Request::Text {
            text: "https://youtu.be/abc".into(),
            message: LINK_MESSAGE,
        }
    }

    impl Harness {
        fn spawn(&self, request: Request) -> tokio::task::JoinHandle<Result<()>> {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move { handler.handle(A, request).await })
        }

        /// Wait until the prompt is up and return its id.
        async fn prompt(&self) -> MessageRef {
            loop {
                let sent = self.notifier.calls().into_iter().find_map(|c| match c {
                    Call::Choices { id, .. } => Some(id),
                    _ => None,
                });
                if let Some(id) = sent {
                    assert!(self.registry.is_choice_active(A));
                    return id;
                }
                tokio::task::yield_now().await;
            }
        }

        fn press(&self, prompt: MessageRef, value: &str) {
            let response = ChoiceResponse::new(prompt, value).with_ack_id("cb-1");
            assert!(self.registry.deliver(A, response).is_queued());
        }
    }

    #[tokio::test]
    async fn start_command_greets() {
        let h = harness(FakeSource::default());
        h.handler
            .handle(A, Request::Command {
                name: "start".into(),
                args: String::new(),
                message: MessageRef(1),
            })
            .await
            .unwrap();
        assert_eq!(h.notifier.texts(), vec![h.messages.start.clone()]);
    }

    #[tokio::test]
    async fn unknown_command_maps_to_catalog_message() {
        let h = harness(FakeSource::default());
        let err = h
            .handler
            .handle(A, Request::Command {
                name: "help".into(),
                args: String::new(),
                message: MessageRef(1),
            })
            .await
            .unwrap_err();

        h.handler.report_error(A, &err).await;
        assert_eq!(h.notifier.texts(), vec![h.messages.unknown_command.clone()]);
    }

    #[tokio::test]
    async fn text_that_is_not_a_link_is_rejected() {
        let h = harness(FakeSource::default());
        let err = h
            .handler
            .handle(A, Request::Text {
                text: "hello".into(),
                message: MessageRef(1),
            })
            .await
            .unwrap_err();
        assert_eq!(h.handler.user_message(&err), h.messages.invalid_link);
    }

    #[tokio::test(start_paused = true)]
    async fn chosen_quality_is_downloaded_and_sent() {
        let h = harness(FakeSource::default());
        let task = h.spawn(link_request());
        let prompt = h.prompt().await;

        h.press(prompt, "140");
        task.await.unwrap().unwrap();

        let calls = h.notifier.calls();
        assert_eq!(calls[0], Call::Choices {
            id: prompt,
            reply_to: Some(LINK_MESSAGE),
            values: vec!["139".into(), "140".into(), CANCEL_CHOICE.into()],
        });
        assert!(calls.contains(&Call::Strip(prompt)));
        assert!(calls.contains(&Call::Ack("cb-1".into())));
        assert_eq!(h.notifier.edits(), vec![
            h.messages.download.clone(),
            h.messages.send.clone()
        ]);
        assert_eq!(
            calls.last(),
            Some(&Call::File(Some(prompt), "Song-140.mp3".into()))
        );
        assert!(!h.registry.is_choice_active(A));
    }

    #[tokio::test(start_paused = true)]
    async fn press_right_after_the_prompt_is_sent_is_not_lost() {
        let h = harness(FakeSource::default());
        h.notifier.press_on_send(Arc::clone(&h.registry), "140");
        let start = Instant::now();

        h.handler.handle(A, link_request()).await.unwrap();

        assert_eq!(h.notifier.instant_press_delivery(), Some("queued"));
        assert_eq!(h.notifier.edits(), vec![
            h.messages.download.clone(),
            h.messages.send.clone()
        ]);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!h.registry.is_choice_active(A));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_times_out_before_any_prompt() {
        let h = harness(FakeSource {
            probe_delay: Duration::from_secs(60),
            ..Default::default()
        });
        let start = Instant::now();

        h.handler.handle(A, link_request()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(h.notifier.calls(), vec![Call::Text(h.messages.timeout.clone())]);
        assert!(!h.registry.is_choice_active(A));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_button_edits_prompt() {
        let h = harness(FakeSource::default());
        let task = h.spawn(link_request());
        let prompt = h.prompt().await;

        h.press(prompt, CANCEL_CHOICE);
        task.await.unwrap().unwrap();

        assert_eq!(h.notifier.edits(), vec![h.messages.cancel.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_press_times_out_with_notice() {
        let h = harness(FakeSource::default());
        let start = Instant::now();

        h.handler.handle(A, link_request()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(h.notifier.edits(), vec![h.messages.no_choice.clone()]);
        assert!(!h.registry.is_choice_active(A));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_download_times_out() {
        let h = harness(FakeSource {
            fetch_delay: Duration::from_secs(60),
            ..Default::default()
        });
        let task = h.spawn(link_request());
        let prompt = h.prompt().await;

        h.press(prompt, "139");
        task.await.unwrap().unwrap();

        assert_eq!(h.notifier.edits(), vec![
            h.messages.download.clone(),
            h.messages.timeout.clone()
        ]);
        assert!(!h.notifier.calls().iter().any(|c| matches!(c, Call::File(..))));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_download_is_an_internal_error() {
        let h = harness(FakeSource {
            fail: true,
            ..Default::default()
        });
        let task = h.spawn(link_request());
        let prompt = h.prompt().await;

        h.press(prompt, "140");
        let err = task.await.unwrap().unwrap_err();

        assert_eq!(h.handler.user_message(&err), h.messages.internal);
    }

    #[tokio::test(start_paused = true)]
    async fn second_link_while_choosing_asks_to_finish_first() {
        let h = harness(FakeSource::default());
        let first = h.spawn(link_request());
        let prompt = h.prompt().await;

        let err = h.handler.handle(A, link_request()).await.unwrap_err();
        assert_eq!(h.handler.user_message(&err), h.messages.make_choice);

        h.press(prompt, CANCEL_CHOICE);
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn video_without_known_format_is_reported() {
        let h = harness(FakeSource {
            itags: vec![18, 22, 251],
            ..Default::default()
        });
        let err = h.handler.handle(A, link_request()).await.unwrap_err();

        assert_eq!(h.handler.user_message(&err), h.messages.no_format);
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn too_long_video_is_refused() {
        let h = harness(FakeSource {
            duration: Duration::from_secs(3600),
            ..Default::default()
        });
        let err = h.handler.handle(A, link_request()).await.unwrap_err();

        assert!(err.to_string().contains("too long"));
        assert_eq!(h.handler.user_message(&err), h.messages.internal);
    }

    #[tokio::test]
    async fn dropped_press_is_acknowledged() {
        let h = harness(FakeSource::default());
        h.handler
            .response_dropped(A, ChoiceResponse::new(MessageRef(9), "140").with_ack_id("cb-9"))
            .await;
        assert_eq!(h.notifier.calls(), vec![Call::Ack("cb-9".into())]);
    }

    #[tokio::test]
    async fn expiry_notice_only_when_configured() {
        let notifier = Arc::new(RecordingNotifier::default());
        assert!(ExpiryNotice::from_messages(notifier.clone(), &Messages::default()).is_none());

        let messages = Messages {
            session_expired: Some("Session expired, send the link again".into()),
            ..Default::default()
        };
        let notice = ExpiryNotice::from_messages(notifier.clone(), &messages).unwrap();
        notice.session_evicted(A).await.unwrap();

        assert_eq!(notifier.texts(), vec![
            "Session expired, send the link again".to_string()
        ]);
    }
}
