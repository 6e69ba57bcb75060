//! Client-side upload state machine with duplicate-name resolution.
//!
//! One orchestrator drives one upload attempt at a time: encode, submit,
//! and on a duplicate name hold the encoded payload while the caller picks
//! rename, replace, or cancel. Every attempt ends in exactly one terminal
//! event on the [`UploadEvents`] sink.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;

use crate::category::Category;

/// Transport-level view of the storage gateway, as much of it as the
/// upload flow needs.
pub trait MediaGateway {
    /// Submits one encoded payload; returns the issued object URL.
    async fn create(
        &mut self,
        category: Category,
        name: &str,
        payload: &str,
        content_type: &str,
    ) -> Result<String, GatewayError>;

    async fn delete(&mut self, category: Category, name: &str) -> Result<(), GatewayError>;
}

#[derive(Debug)]
pub enum GatewayError {
    /// The target name already exists in its category.
    Conflict(String),
    /// The server answered with any other error.
    Rejected(String),
    /// The request never produced a server answer.
    Transport(String),
}

impl GatewayError {
    pub fn message(&self) -> &str {
        match self {
            GatewayError::Conflict(msg)
            | GatewayError::Rejected(msg)
            | GatewayError::Transport(msg) => msg,
        }
    }
}

/// Terminal-transition sink. Implementations refresh listings or surface
/// notifications; the orchestrator guarantees exactly one call per attempt.
pub trait UploadEvents {
    fn completed(&mut self, url: &str);
    fn failed(&mut self, message: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Submitting,
    AwaitingChoice,
    RenameSubmitting,
    ReplaceSubmitting,
}

/// What one submit or resolution call ended in.
#[derive(Debug)]
pub enum SubmitOutcome {
    Completed { url: String },
    /// Waiting for the user to pick rename, replace, or cancel.
    Conflict { suggested_name: String },
    Failed,
}

// One in-flight attempt. The encoded payload survives into the resolution
// round so the source file is never re-read or re-encoded.
struct PendingAttempt {
    name: String,
    content_type: String,
    payload: String,
    suggested_name: String,
}

pub struct UploadOrchestrator<G, E> {
    gateway: G,
    events: E,
    category: Category,
    phase: UploadPhase,
    pending: Option<PendingAttempt>,
}

impl<G: MediaGateway, E: UploadEvents> UploadOrchestrator<G, E> {
    pub fn new(gateway: G, events: E, category: Category) -> Self {
        Self {
            gateway,
            events,
            category,
            phase: UploadPhase::Idle,
            pending: None,
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// The pre-computed alternate name, present while a conflict is open.
    pub fn suggested_name(&self) -> Option<&str> {
        self.pending
            .as_ref()
            .map(|pending| pending.suggested_name.as_str())
    }

    /// Encodes `bytes` and submits them under `name`.
    pub async fn submit(
        &mut self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> SubmitOutcome {
        let payload = BASE64.encode(bytes);
        self.phase = UploadPhase::Submitting;
        match self
            .gateway
            .create(self.category, name, &payload, content_type)
            .await
        {
            Ok(url) => self.finish_completed(url),
            Err(GatewayError::Conflict(_)) => {
                let suggested_name = suggest_alternate_name(name);
                self.pending = Some(PendingAttempt {
                    name: name.to_string(),
                    content_type: content_type.to_string(),
                    payload,
                    suggested_name: suggested_name.clone(),
                });
                self.phase = UploadPhase::AwaitingChoice;
                SubmitOutcome::Conflict { suggested_name }
            }
            Err(err) => self.finish_failed(err.message().to_string()),
        }
    }

    /// Resubmits the held payload under `new_name`. If the new name also
    /// collides the conflict stays open with a fresh suggestion.
    pub async fn resolve_rename(&mut self, new_name: &str) -> SubmitOutcome {
        let Some(pending) = self.pending.take() else {
            return self.finish_failed("no upload awaiting resolution".to_string());
        };
        self.phase = UploadPhase::RenameSubmitting;
        match self
            .gateway
            .create(self.category, new_name, &pending.payload, &pending.content_type)
            .await
        {
            Ok(url) => self.finish_completed(url),
            Err(GatewayError::Conflict(_)) => {
                let suggested_name = suggest_alternate_name(&pending.name);
                self.pending = Some(PendingAttempt {
                    suggested_name: suggested_name.clone(),
                    ..pending
                });
                self.phase = UploadPhase::AwaitingChoice;
                SubmitOutcome::Conflict { suggested_name }
            }
            Err(err) => self.finish_failed(err.message().to_string()),
        }
    }

    /// Deletes the existing object, then reinstalls the held payload under
    /// the original name. A failed delete aborts without attempting the
    /// create.
    pub async fn resolve_replace(&mut self) -> SubmitOutcome {
        let Some(pending) = self.pending.take() else {
            return self.finish_failed("no upload awaiting resolution".to_string());
        };
        self.phase = UploadPhase::ReplaceSubmitting;

        if let Err(err) = self.gateway.delete(self.category, &pending.name).await {
            return self.finish_failed(format!("replace aborted: {}", err.message()));
        }
        match self
            .gateway
            .create(
                self.category,
                &pending.name,
                &pending.payload,
                &pending.content_type,
            )
            .await
        {
            Ok(url) => self.finish_completed(url),
            Err(err) => self.finish_failed(err.message().to_string()),
        }
    }

    /// Discards the pending attempt without telling the server anything.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.phase = UploadPhase::Idle;
    }

    fn finish_completed(&mut self, url: String) -> SubmitOutcome {
        self.pending = None;
        self.phase = UploadPhase::Idle;
        self.events.completed(&url);
        SubmitOutcome::Completed { url }
    }

    fn finish_failed(&mut self, message: String) -> SubmitOutcome {
        self.pending = None;
        self.phase = UploadPhase::Idle;
        self.events.failed(&message);
        SubmitOutcome::Failed
    }
}

/// Original base name plus a short time-derived tag, extension preserved:
/// `photo.png` becomes `photo_4821.png`.
pub fn suggest_alternate_name(name: &str) -> String {
    let millis = Utc::now().timestamp_millis().to_string();
    let tag = &millis[millis.len().saturating_sub(4)..];
    match name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => format!("{base}_{tag}.{ext}"),
        _ => format!("{name}_{tag}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockGateway {
        objects: HashMap<String, String>,
        fail_delete: bool,
        deletes: usize,
        creates: usize,
    }

    impl MockGateway {
        fn key(category: Category, name: &str) -> String {
            format!("{category}/{}", name.to_lowercase())
        }

        fn with_object(name: &str, payload: &str) -> Self {
            let mut gateway = Self::default();
            gateway
                .objects
                .insert(Self::key(Category::Images, name), payload.to_string());
            gateway
        }
    }

    impl MediaGateway for MockGateway {
        async fn create(
            &mut self,
            category: Category,
            name: &str,
            payload: &str,
            _content_type: &str,
        ) -> Result<String, GatewayError> {
            self.creates += 1;
            let key = Self::key(category, name);
            if self.objects.contains_key(&key) {
                return Err(GatewayError::Conflict(
                    "File with the same name already exists".into(),
                ));
            }
            self.objects.insert(key, payload.to_string());
            Ok(format!("http://localhost:5005/api/{category}/{name}"))
        }

        async fn delete(&mut self, category: Category, name: &str) -> Result<(), GatewayError> {
            self.deletes += 1;
            if self.fail_delete {
                return Err(GatewayError::Rejected("delete refused".into()));
            }
            match self.objects.remove(&Self::key(category, name)) {
                Some(_) => Ok(()),
                None => Err(GatewayError::Rejected("File not found".into())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingEvents {
        completed: Vec<String>,
        failed: Vec<String>,
    }

    impl UploadEvents for RecordingEvents {
        fn completed(&mut self, url: &str) {
            self.completed.push(url.to_string());
        }

        fn failed(&mut self, message: &str) {
            self.failed.push(message.to_string());
        }
    }

    fn make_orchestrator(
        gateway: MockGateway,
    ) -> UploadOrchestrator<MockGateway, RecordingEvents> {
        UploadOrchestrator::new(gateway, RecordingEvents::default(), Category::Images)
    }

    #[tokio::test]
    async fn fresh_upload_completes_with_one_event() {
        let mut orchestrator = make_orchestrator(MockGateway::default());
        let outcome = orchestrator.submit("photo.png", "image/png", b"bytes").await;

        assert!(matches!(outcome, SubmitOutcome::Completed { .. }));
        assert_eq!(orchestrator.phase(), UploadPhase::Idle);
        assert_eq!(orchestrator.events.completed.len(), 1);
        assert!(orchestrator.events.failed.is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_waits_for_a_choice() {
        let mut orchestrator =
            make_orchestrator(MockGateway::with_object("photo.png", "old"));
        let outcome = orchestrator.submit("photo.png", "image/png", b"new").await;

        let SubmitOutcome::Conflict { suggested_name } = outcome else {
            panic!("expected a conflict");
        };
        assert!(suggested_name.starts_with("photo_"));
        assert!(suggested_name.ends_with(".png"));
        assert_eq!(orchestrator.phase(), UploadPhase::AwaitingChoice);
        assert_eq!(orchestrator.suggested_name(), Some(suggested_name.as_str()));
        // No terminal event while the conflict is open.
        assert!(orchestrator.events.completed.is_empty());
        assert!(orchestrator.events.failed.is_empty());
    }

    #[tokio::test]
    async fn rename_keeps_the_original_object() {
        let mut orchestrator =
            make_orchestrator(MockGateway::with_object("photo.png", "old"));
        orchestrator.submit("photo.png", "image/png", b"new").await;

        let suggested = orchestrator.suggested_name().expect("suggestion").to_string();
        let outcome = orchestrator.resolve_rename(&suggested).await;

        assert!(matches!(outcome, SubmitOutcome::Completed { .. }));
        assert_eq!(orchestrator.gateway.objects.len(), 2);
        assert_eq!(
            orchestrator
                .gateway
                .objects
                .get(&MockGateway::key(Category::Images, "photo.png"))
                .map(String::as_str),
            Some("old")
        );
        assert_eq!(orchestrator.events.completed.len(), 1);
    }

    #[tokio::test]
    async fn replace_deletes_then_reinstalls_under_the_same_name() {
        let mut orchestrator =
            make_orchestrator(MockGateway::with_object("photo.png", "old"));
        orchestrator.submit("photo.png", "image/png", b"new").await;

        let outcome = orchestrator.resolve_replace().await;
        assert!(matches!(outcome, SubmitOutcome::Completed { .. }));
        assert_eq!(orchestrator.gateway.deletes, 1);
        assert_eq!(orchestrator.gateway.objects.len(), 1);

        let stored = orchestrator
            .gateway
            .objects
            .get(&MockGateway::key(Category::Images, "photo.png"))
            .expect("replaced object");
        assert_eq!(stored, &BASE64.encode(b"new"));
    }

    #[tokio::test]
    async fn failed_delete_aborts_replace_without_create() {
        let mut gateway = MockGateway::with_object("photo.png", "old");
        gateway.fail_delete = true;
        let mut orchestrator = make_orchestrator(gateway);
        orchestrator.submit("photo.png", "image/png", b"new").await;
        let creates_before = orchestrator.gateway.creates;

        let outcome = orchestrator.resolve_replace().await;
        assert!(matches!(outcome, SubmitOutcome::Failed));
        assert_eq!(orchestrator.gateway.creates, creates_before);
        assert_eq!(orchestrator.events.failed.len(), 1);
        assert_eq!(orchestrator.phase(), UploadPhase::Idle);
    }

    #[tokio::test]
    async fn rejected_upload_fails_with_the_server_message() {
        struct RejectingGateway;
        impl MediaGateway for RejectingGateway {
            async fn create(
                &mut self,
                _category: Category,
                _name: &str,
                _payload: &str,
                _content_type: &str,
            ) -> Result<String, GatewayError> {
                Err(GatewayError::Rejected("Invalid type parameter".into()))
            }
            async fn delete(
                &mut self,
                _category: Category,
                _name: &str,
            ) -> Result<(), GatewayError> {
                unreachable!("delete is never reached")
            }
        }

        let mut orchestrator = UploadOrchestrator::new(
            RejectingGateway,
            RecordingEvents::default(),
            Category::Images,
        );
        let outcome = orchestrator.submit("photo.png", "image/png", b"x").await;
        assert!(matches!(outcome, SubmitOutcome::Failed));
        assert_eq!(
            orchestrator.events.failed,
            vec!["Invalid type parameter".to_string()]
        );
    }

    #[tokio::test]
    async fn cancel_returns_to_idle_without_events() {
        let mut orchestrator =
            make_orchestrator(MockGateway::with_object("photo.png", "old"));
        orchestrator.submit("photo.png", "image/png", b"new").await;

        orchestrator.cancel();
        assert_eq!(orchestrator.phase(), UploadPhase::Idle);
        assert_eq!(orchestrator.suggested_name(), None);
        assert!(orchestrator.events.completed.is_empty());
        assert!(orchestrator.events.failed.is_empty());
    }

    #[test]
    fn suggested_name_keeps_base_and_extension() {
        let suggested = suggest_alternate_name("photo.png");
        assert!(suggested.starts_with("photo_"));
        assert!(suggested.ends_with(".png"));
        assert_eq!(suggested.len(), "photo_0000.png".len());

        let bare = suggest_alternate_name("README");
        assert!(bare.starts_with("README_"));
    }
}
