//! Editing presence: "who else has this record open right now".
//!
//! ## Data flow
//!
//! ```text
//! form opens record R
//!       │
//!       ▼
//! PresenceCoordinator::begin_editing(R)  ──► start_editing { R, me }
//!       │
//!       ▼
//! EditingSession  ◄── editing_status_update { R, users }  (via DispatchRegistry)
//!       │                  │
//!       │                  ▼
//!       │         users − { me, "", "anonymous" }, deduplicated
//!       │                  │ (only when the list changed)
//!       │                  ▼
//!       │         on_change(list) + NotificationSurface::show / hide
//!       ▼
//! close() / drop  ──► stop_editing { R, me }   (exactly once)
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::{ConnectionManager, MessageSink};
use crate::dispatch::{DispatchRegistry, Subscription};
use crate::protocol::{RecordId, WireMessage};

/// Name announced when no user is logged in. Never shown as a remote editor.
pub const ANONYMOUS: &str = "anonymous";

/// Default text in front of the remote editor list.
pub const DEFAULT_NOTICE_PREFIX: &str = "Also editing: ";

/// Renders the "others are editing" notice (toast, banner, status line…).
pub trait NotificationSurface: Send + Sync {
    fn show(&self, message: &str);
    fn hide(&self);
}

/// Supplies the local user's display name.
pub trait IdentityProvider: Send + Sync {
    fn current_user_name(&self) -> Option<String>;
}

/// Notice state of an editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationState {
    /// Nobody else is editing, or the notice was cleared
    Idle,
    /// Remote editors currently shown
    Active(Vec<String>),
}

/// Remote editors from a status update: server order, first occurrence
/// wins, without `local_user`, blank names or [`ANONYMOUS`].
pub fn remote_editors(users: &[String], local_user: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    users
        .iter()
        .filter(|user| {
            let name = user.as_str();
            !name.trim().is_empty() && name != local_user && name != ANONYMOUS
        })
        .filter(|user| seen.insert(user.as_str()))
        .cloned()
        .collect()
}

fn resolve_user_name(name: Option<String>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name,
        _ => ANONYMOUS.to_string(),
    }
}

type ChangeCallback = Box<dyn Fn(&[String]) + Send + Sync>;

/// Creates [`EditingSession`]s bound to one connection.
pub struct PresenceCoordinator {
    sink: Arc<dyn MessageSink>,
    registry: DispatchRegistry,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn NotificationSurface>,
    notice_prefix: String,
}

impl PresenceCoordinator {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        registry: DispatchRegistry,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSurface>,
    ) -> Self {
        Self {
            sink,
            registry,
            identity,
            notifier,
            notice_prefix: DEFAULT_NOTICE_PREFIX.to_string(),
        }
    }

    /// Coordinator that sends and listens through `manager`.
    pub fn for_manager(
        manager: Arc<ConnectionManager>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSurface>,
    ) -> Self {
        let registry = manager.registry().clone();
        Self::new(manager, registry, identity, notifier)
    }

    pub fn with_notice_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.notice_prefix = prefix.into();
        self
    }

    /// Enter edit mode for `record_id`.
    pub fn begin_editing(&self, record_id: RecordId) -> EditingSession {
        self.begin_editing_with(record_id, |_| {})
    }

    /// Enter edit mode for `record_id`, calling `on_change` whenever the
    /// remote editor list changes.
    ///
    /// Announces `start_editing` once. The session announces
    /// `stop_editing` once when closed or dropped.
    ///
    /// `on_change` runs while the session's notice is locked and must not
    /// call back into the session.
    pub fn begin_editing_with<F>(&self, record_id: RecordId, on_change: F) -> EditingSession
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        let user_name = resolve_user_name(self.identity.current_user_name());
        let state = Arc::new(SessionState {
            record_id,
            user_name,
            notice: Mutex::new(NoticeState::default()),
            notifier: Arc::clone(&self.notifier),
            notice_prefix: self.notice_prefix.clone(),
            on_change: Box::new(on_change),
        });

        // Listen before announcing so the server's first status reply is seen.
        let listener = Arc::clone(&state);
        let subscription = self
            .registry
            .subscribe_fn(move |message| listener.handle_message(message));

        let start = WireMessage::start_editing(record_id, state.user_name.as_str());
        if self.sink.send_message(&start) {
            log::info!("{} started editing record {record_id}", state.user_name);
        } else {
            log::warn!("start_editing for record {record_id} was not sent");
        }

        EditingSession {
            state,
            subscription,
            sink: Arc::clone(&self.sink),
        }
    }
}

/// Guarded together so no status update can touch the notice once the
/// session is closed.
#[derive(Default)]
struct NoticeState {
    editors: Vec<String>,
    closed: bool,
}

struct SessionState {
    record_id: RecordId,
    user_name: String,
    /// Held while `on_change` and the notifier run.
    notice: Mutex<NoticeState>,
    notifier: Arc<dyn NotificationSurface>,
    notice_prefix: String,
    on_change: ChangeCallback,
}

impl SessionState {
    fn notice(&self) -> MutexGuard<'_, NoticeState> {
        self.notice.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_message(&self, message: &WireMessage) {
        let WireMessage::EditingStatusUpdate { payload } = message else {
            return;
        };
        if payload.record_id != self.record_id {
            return;
        }

        let mut notice = self.notice();
        if notice.closed {
            return;
        }
        let editors = remote_editors(&payload.users, &self.user_name);
        if notice.editors == editors {
            return;
        }
        notice.editors.clone_from(&editors);
        log::debug!("Record {}: remote editors {:?}", self.record_id, editors);

        (self.on_change)(&editors);
        if editors.is_empty() {
            self.notifier.hide();
        } else {
            let text = format!("{}{}", self.notice_prefix, editors.join(", "));
            self.notifier.show(&text);
        }
    }

    fn clear(&self) {
        let mut notice = self.notice();
        notice.editors.clear();
        self.notifier.hide();
    }

    /// Mark closed; `false` if it already was.
    fn mark_closed(&self) -> bool {
        !std::mem::replace(&mut self.notice().closed, true)
    }
}

/// One open form's presence: announces start on creation and stop on
/// [`close`](Self::close) or drop, and tracks the remote editors.
pub struct EditingSession {
    state: Arc<SessionState>,
    subscription: Subscription,
    sink: Arc<dyn MessageSink>,
}

impl EditingSession {
    pub fn record_id(&self) -> RecordId {
        self.state.record_id
    }

    /// Name this session announced itself with.
    pub fn user_name(&self) -> &str {
        &self.state.user_name
    }

    /// Last known remote editors, deduplicated and without the local user.
    pub fn remote_editors(&self) -> Vec<String> {
        self.state.notice().editors.clone()
    }

    pub fn notification_state(&self) -> NotificationState {
        let notice = self.state.notice();
        if notice.editors.is_empty() {
            NotificationState::Idle
        } else {
            NotificationState::Active(notice.editors.clone())
        }
    }

    /// Empty the remote editor list and hide the notice, whatever the
    /// server last said. A later status update can show it again.
    pub fn clear_notification(&self) {
        self.state.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.notice().closed
    }

    /// Leave edit mode: unsubscribe, announce `stop_editing`, hide the
    /// notice. Only the first call does anything.
    ///
    /// Waits for a status update that is being applied to finish, so the
    /// notice is always hidden afterwards.
    pub fn close(&mut self) {
        if !self.state.mark_closed() {
            return;
        }
        self.subscription.unsubscribe();

        let record_id = self.state.record_id;
        let stop = WireMessage::stop_editing(record_id, self.state.user_name.as_str());
        if self.sink.send_message(&stop) {
            log::info!("{} stopped editing record {record_id}", self.state.user_name);
        } else {
            log::warn!("stop_editing for record {record_id} was not sent");
        }
        self.state.clear();
    }
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        self.close();
    }
}
