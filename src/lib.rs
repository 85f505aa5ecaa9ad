//! bevy_llm_chat: a single-screen chat over one llm session, as a bevy plugin.
//!
//! - `ConversationStore` holds the transcript, the draft and a status line.
//! - `ChatController` owns the session and runs the readiness check and the
//!   send lifecycle.
//! - request work with `InitializeModel` / `SendMessage` events; observe the
//!   store through `ConversationChanged` events (after `ChatSet::Publish`).
//! - never blocks the main thread: on native collaborator calls run on a tiny
//!   tokio runtime, on wasm on bevy's async pool. results come back through a
//!   channel inbox drained on the main schedule, which is the only place the
//!   store is mutated.
//!
//! api docs for the backend types: https://docs.rs/llm

use bevy::prelude::*;
#[cfg(target_arch = "wasm32")]
use bevy::tasks::AsyncComputeTaskPool;
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::Arc;

pub mod config;
pub mod controller;
pub mod error;
pub mod llm_backend;
pub mod message;
pub mod model;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{ChatConfig, SendPolicy};
pub use controller::{ChatController, ModelPhase, status_for};
pub use error::ChatError;
pub use llm_backend::LlmModel;
pub use message::{Message, MessageId, Origin};
pub use model::{
    Availability, LanguageModel, LanguageModelHandle, ModelResponse, ModelSession,
    UnavailableReason,
};
pub use store::{ConversationChanged, ConversationStore};

/// re-export the llm types the backend is built from.
pub use llm::{
    LLMProvider,
    builder::{LLMBackend, LLMBuilder},
    chat::{ChatMessage, ChatProvider, ChatRole},
    error::LLMError,
};

/// on native we keep a tiny tokio runtime to drive collaborator futures.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_llm_chat", "ChatPlugin: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering inside `Update`; presentation systems go after `Publish`.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ChatSet {
    /// `InitializeModel` / `SendMessage` requests are accepted here
    Intake,
    /// finished collaborator calls are applied to the store here
    Drain,
    /// store changes are re-emitted as `ConversationChanged` here
    Publish,
}

/// request the one-shot availability check. only the first request counts.
#[derive(Event, Debug, Clone, Copy, Default)]
pub struct InitializeModel;

/// request sending the current draft.
#[derive(Event, Debug, Clone, Copy, Default)]
pub struct SendMessage;

/// results of collaborator calls; producers send, main thread drains.
enum InboxMsg {
    Ready(Arc<dyn ModelSession>),
    Unavailable(UnavailableReason),
    Reply(Result<String, String>),
}

/// bounded to avoid unbounded growth when the frame stalls briefly.
#[derive(Resource, Clone)]
struct ControllerInbox {
    tx: Sender<InboxMsg>,
    rx: Receiver<InboxMsg>,
}

impl Default for ControllerInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(256);
        Self { tx, rx }
    }
}

/// send to inbox without blocking the worker. a full inbox drops the result;
/// a disconnected one means the app is shutting down.
fn push_inbox(tx: &Sender<InboxMsg>, msg: InboxMsg) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            error!(target: "bevy_llm_chat", "controller inbox full; dropping collaborator result");
            false
        }
        Err(TrySendError::Disconnected(_)) => {
            debug!(target: "bevy_llm_chat", "controller inbox disconnected; dropping collaborator result");
            false
        }
    }
}

/// bevy plugin: wires systems, events, resources.
///
/// insert a `LanguageModelHandle` (e.g. around `LlmModel`) before startup, and
/// optionally a `ChatConfig`. on native, also inserts a tokio runtime
/// resource unless one exists.
pub struct ChatPlugin;

impl Plugin for ChatPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_llm_chat", "ChatPlugin: build()");
        app.init_resource::<ChatConfig>()
            .init_resource::<ConversationStore>()
            .init_resource::<ChatController>()
            .init_resource::<ControllerInbox>()
            .add_event::<InitializeModel>()
            .add_event::<SendMessage>()
            .add_event::<ConversationChanged>()
            .configure_sets(
                Update,
                (ChatSet::Intake, ChatSet::Drain, ChatSet::Publish).chain(),
            )
            .add_systems(Startup, request_initialization)
            .add_systems(
                Update,
                (start_initialization, handle_send_requests)
                    .chain()
                    .in_set(ChatSet::Intake),
            )
            .add_systems(Update, drain_controller_inbox.in_set(ChatSet::Drain))
            .add_systems(Update, publish_store_changes.in_set(ChatSet::Publish));

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

/// runs a collaborator future off the main thread.
#[cfg(not(target_arch = "wasm32"))]
fn spawn_work(rt: &TokioRt, fut: impl Future<Output = ()> + Send + 'static) {
    rt.0.spawn(fut);
}

#[cfg(target_arch = "wasm32")]
fn spawn_work(fut: impl Future<Output = ()> + 'static) {
    AsyncComputeTaskPool::get().spawn(fut).detach();
}

fn request_initialization(config: Res<ChatConfig>, mut writer: EventWriter<InitializeModel>) {
    if config.auto_initialize {
        debug!(target: "bevy_llm_chat", "auto_initialize: requesting availability check");
        writer.write(InitializeModel);
    }
}

fn start_initialization(
    mut requests: EventReader<InitializeModel>,
    model: Option<Res<LanguageModelHandle>>,
    mut controller: ResMut<ChatController>,
    mut store: ResMut<ConversationStore>,
    inbox: Res<ControllerInbox>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    if requests.read().count() == 0 {
        return;
    }
    if !controller.begin_check() {
        debug!(target: "bevy_llm_chat",
            "InitializeModel ignored: check already ran (phase={:?})", controller.phase());
        return;
    }

    let Some(model) = model else {
        warn!(target: "bevy_llm_chat", "InitializeModel: no LanguageModelHandle resource installed");
        controller.finish_check_unavailable(
            UnavailableReason::Other("no language model installed".into()),
            &mut store,
        );
        return;
    };

    info!(target: "bevy_llm_chat", "initialize: querying model availability");
    let model = model.0.clone();
    let tx = inbox.tx.clone();
    let run = async move {
        let msg = match model.availability().await {
            Availability::Available => match model.create_session().await {
                Ok(session) => {
                    session.prewarm().await;
                    InboxMsg::Ready(session)
                }
                Err(err) => {
                    error!(target: "bevy_llm_chat", "create_session failed: {}", err);
                    InboxMsg::Unavailable(UnavailableReason::Other(err.to_string()))
                }
            },
            Availability::Unavailable(reason) => InboxMsg::Unavailable(reason),
        };
        push_inbox(&tx, msg);
    };

    #[cfg(not(target_arch = "wasm32"))]
    spawn_work(&rt, run);
    #[cfg(target_arch = "wasm32")]
    spawn_work(run);
}

fn handle_send_requests(
    mut requests: EventReader<SendMessage>,
    config: Res<ChatConfig>,
    mut controller: ResMut<ChatController>,
    mut store: ResMut<ConversationStore>,
    inbox: Res<ControllerInbox>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for _ in requests.read() {
        let Some(pending) = controller.begin_send(&mut store, config.send_policy) else {
            debug!(target: "bevy_llm_chat",
                "SendMessage skipped: ready={} in_flight={} draft_blank={}",
                controller.is_ready(),
                controller.in_flight(),
                controller::is_blank_draft(store.draft())
            );
            continue;
        };

        info!(target: "bevy_llm_chat",
            "send: prompt_len={} in_flight={}", pending.prompt.len(), controller.in_flight());

        let tx = inbox.tx.clone();
        let run = async move {
            let outcome = pending.run().await.map_err(|err| {
                warn!(target: "bevy_llm_chat", "respond failed: {}", err);
                err.to_string()
            });
            push_inbox(&tx, InboxMsg::Reply(outcome));
        };

        #[cfg(not(target_arch = "wasm32"))]
        spawn_work(&rt, run);
        #[cfg(target_arch = "wasm32")]
        spawn_work(run);
    }
}

/// drains the inbox and applies results to controller + store.
fn drain_controller_inbox(
    inbox: Res<ControllerInbox>,
    mut controller: ResMut<ChatController>,
    mut store: ResMut<ConversationStore>,
) {
    // cap per frame to avoid long frames on bursts
    const MAX_PER_FRAME: usize = 64;
    for _ in 0..MAX_PER_FRAME {
        let msg = match inbox.rx.try_recv() {
            Ok(m) => m,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        };
        match msg {
            InboxMsg::Ready(session) => {
                info!(target: "bevy_llm_chat", "initialize: session ready");
                controller.finish_check_ready(session, &mut store);
            }
            InboxMsg::Unavailable(reason) => {
                warn!(target: "bevy_llm_chat", "initialize: model unavailable ({:?})", reason);
                controller.finish_check_unavailable(reason, &mut store);
            }
            InboxMsg::Reply(outcome) => {
                match &outcome {
                    Ok(text) => info!(target: "bevy_llm_chat", "reply received: len={}", text.len()),
                    Err(err) => info!(target: "bevy_llm_chat", "reply failed: {}", err),
                }
                controller.finish_send(outcome, &mut store);
            }
        }
    }
}

/// re-emits the store's change log as events, oldest first.
fn publish_store_changes(
    mut store: ResMut<ConversationStore>,
    mut writer: EventWriter<ConversationChanged>,
) {
    if !store.has_pending_changes() {
        return;
    }
    for change in store.take_changes() {
        writer.write(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{STATUS_MODEL_NOT_READY, STATUS_READY, STATUS_UNKNOWN};
    use crate::testing::{ScriptedModel, ScriptedSession};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn chat_app(model: ScriptedModel, config: ChatConfig) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(config);
        app.insert_resource(LanguageModelHandle::new(model));
        app.add_plugins(ChatPlugin);
        app
    }

    /// runs frames until `done` holds; collaborator calls finish on tokio.
    fn update_until(app: &mut App, done: impl Fn(&World) -> bool) -> bool {
        for _ in 0..500 {
            app.update();
            if done(app.world()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn store(app: &App) -> &ConversationStore {
        app.world().resource::<ConversationStore>()
    }

    fn controller(app: &App) -> &ChatController {
        app.world().resource::<ChatController>()
    }

    fn set_draft(app: &mut App, text: &str) {
        app.world_mut().resource_mut::<ConversationStore>().set_draft(text);
    }

    fn send(app: &mut App) {
        app.world_mut().send_event(SendMessage);
        app.update();
    }

    fn ready_app(session: Arc<ScriptedSession>, config: ChatConfig) -> App {
        let mut app = chat_app(ScriptedModel::available(session), config);
        assert!(update_until(&mut app, |w| w.resource::<ChatController>().is_ready()));
        app
    }

    fn contents(app: &App) -> Vec<(String, Origin)> {
        store(app)
            .messages()
            .iter()
            .map(|m| (m.content().to_string(), m.origin()))
            .collect()
    }

    #[test]
    fn startup_check_reaches_ready_and_prewarms() {
        let session = Arc::new(ScriptedSession::default());
        let app = ready_app(session.clone(), ChatConfig::default());

        assert_eq!(controller(&app).phase(), &ModelPhase::Ready);
        assert_eq!(store(&app).status(), STATUS_READY);
        assert!(session.was_prewarmed());
    }

    #[test]
    fn nothing_happens_without_auto_initialize_until_requested() {
        let mut app = chat_app(
            ScriptedModel::available(Arc::default()),
            ChatConfig { auto_initialize: false, ..default() },
        );
        for _ in 0..5 {
            app.update();
        }
        assert_eq!(controller(&app).phase(), &ModelPhase::Uninitialized);

        app.world_mut().send_event(InitializeModel);
        assert!(update_until(&mut app, |w| w.resource::<ChatController>().is_ready()));
    }

    #[test]
    fn model_not_ready_leaves_sends_as_no_ops() {
        let mut app = chat_app(
            ScriptedModel::unavailable(Availability::Unavailable(UnavailableReason::ModelNotReady)),
            ChatConfig::default(),
        );
        assert!(update_until(&mut app, |w| {
            matches!(w.resource::<ChatController>().phase(), ModelPhase::Unavailable(_))
        }));
        assert_eq!(store(&app).status(), STATUS_MODEL_NOT_READY);
        assert!(!controller(&app).is_ready());

        set_draft(&mut app, "Hello");
        send(&mut app);
        assert!(store(&app).messages().is_empty());
        assert_eq!(store(&app).draft(), "Hello");
    }

    #[test]
    fn failed_session_creation_is_unknown_unavailability() {
        let model = ScriptedModel::available(Arc::default()).failing_session("boom");
        let mut app = chat_app(model, ChatConfig::default());
        assert!(update_until(&mut app, |w| {
            matches!(w.resource::<ChatController>().phase(), ModelPhase::Unavailable(_))
        }));
        assert_eq!(store(&app).status(), STATUS_UNKNOWN);
        assert_eq!(
            controller(&app).phase(),
            &ModelPhase::Unavailable(UnavailableReason::Other("boom".into()))
        );
    }

    #[test]
    fn missing_model_resource_is_unknown_unavailability() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(ChatPlugin);
        app.update();
        assert_eq!(store(&app).status(), STATUS_UNKNOWN);
        assert!(!controller(&app).is_ready());
    }

    #[test]
    fn second_initialize_is_ignored() {
        let model = Arc::new(ScriptedModel::available(Arc::default()));
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(LanguageModelHandle(model.clone()));
        app.add_plugins(ChatPlugin);
        assert!(update_until(&mut app, |w| w.resource::<ChatController>().is_ready()));

        app.world_mut().send_event(InitializeModel);
        for _ in 0..5 {
            app.update();
        }
        assert_eq!(model.sessions_created(), 1);
        assert_eq!(controller(&app).phase(), &ModelPhase::Ready);
    }

    #[test]
    fn hello_round_trip() {
        let session = Arc::new(ScriptedSession::replying(["Hi! How can I help?"]));
        let mut app = ready_app(session.clone(), ChatConfig::default());

        set_draft(&mut app, "Hello");
        send(&mut app);

        // user entry and cleared draft land in the same frame as the request
        assert_eq!(contents(&app)[0], ("Hello".to_string(), Origin::User));
        assert_eq!(store(&app).draft(), "");

        assert!(update_until(&mut app, |w| w.resource::<ConversationStore>().messages().len() == 2));
        assert_eq!(
            contents(&app),
            vec![
                ("Hello".to_string(), Origin::User),
                ("Hi! How can I help?".to_string(), Origin::Assistant),
            ]
        );
        assert_eq!(session.prompts(), vec!["Hello".to_string()]);
        assert_eq!(controller(&app).in_flight(), 0);
    }

    #[test]
    fn whitespace_draft_changes_nothing() {
        let mut app = ready_app(Arc::default(), ChatConfig::default());
        set_draft(&mut app, "   ");
        send(&mut app);
        for _ in 0..5 {
            app.update();
        }
        assert!(store(&app).messages().is_empty());
        assert_eq!(store(&app).draft(), "   ");
    }

    #[test]
    fn respond_failure_becomes_error_message() {
        let session = Arc::new(ScriptedSession::default());
        session.queue_error("network lost");
        let mut app = ready_app(session, ChatConfig::default());

        set_draft(&mut app, "Hello");
        send(&mut app);
        assert!(update_until(&mut app, |w| w.resource::<ConversationStore>().messages().len() == 2));

        assert_eq!(
            contents(&app)[1],
            ("Error: network lost".to_string(), Origin::Assistant)
        );
        assert_eq!(store(&app).draft(), "");
        assert_eq!(controller(&app).phase(), &ModelPhase::Ready);
    }

    #[test]
    fn draft_stays_clear_while_reply_is_pending() {
        let (session, release) = ScriptedSession::gated();
        session.queue_reply("late");
        let session = Arc::new(session);
        let mut app = ready_app(session.clone(), ChatConfig::default());

        set_draft(&mut app, "Hello");
        send(&mut app);
        for _ in 0..10 {
            app.update();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(store(&app).draft(), "");
        assert_eq!(store(&app).messages().len(), 1);
        assert_eq!(controller(&app).in_flight(), 1);

        // a new draft can be composed meanwhile
        set_draft(&mut app, "next question");

        release.send(()).unwrap();
        assert!(update_until(&mut app, |w| w.resource::<ConversationStore>().messages().len() == 2));
        assert_eq!(store(&app).draft(), "next question");
    }

    #[test]
    fn reject_policy_ignores_sends_while_awaiting() {
        let (session, release) = ScriptedSession::gated();
        session.queue_reply("one");
        session.queue_reply("two");
        let mut app = ready_app(
            Arc::new(session),
            ChatConfig { send_policy: SendPolicy::RejectWhileAwaiting, ..default() },
        );

        set_draft(&mut app, "first");
        send(&mut app);
        set_draft(&mut app, "second");
        send(&mut app);

        assert_eq!(store(&app).messages().len(), 1);
        assert_eq!(store(&app).draft(), "second");

        release.send(()).unwrap();
        assert!(update_until(&mut app, |w| w.resource::<ChatController>().in_flight() == 0));
        send(&mut app);
        release.send(()).unwrap();
        assert!(update_until(&mut app, |w| w.resource::<ConversationStore>().messages().len() == 4));
    }

    #[test]
    fn concurrent_sends_each_get_one_reply() {
        let (session, release) = ScriptedSession::gated();
        session.queue_reply("a");
        session.queue_reply("b");
        let mut app = ready_app(Arc::new(session), ChatConfig::default());

        set_draft(&mut app, "first");
        send(&mut app);
        set_draft(&mut app, "second");
        send(&mut app);
        assert_eq!(controller(&app).in_flight(), 2);

        release.send(()).unwrap();
        release.send(()).unwrap();
        assert!(update_until(&mut app, |w| w.resource::<ConversationStore>().messages().len() == 4));

        let origins: Vec<Origin> = contents(&app).into_iter().map(|(_, o)| o).collect();
        assert_eq!(
            origins,
            vec![Origin::User, Origin::User, Origin::Assistant, Origin::Assistant]
        );
    }

    #[test]
    fn full_inbox_drops_instead_of_blocking() {
        let (tx, rx) = flume::bounded(1);
        assert!(push_inbox(&tx, InboxMsg::Reply(Ok("first".into()))));
        // would park the caller forever with a blocking send
        assert!(!push_inbox(&tx, InboxMsg::Reply(Ok("second".into()))));

        drop(rx);
        assert!(!push_inbox(&tx, InboxMsg::Reply(Ok("third".into()))));
    }

    #[derive(Resource, Default)]
    struct Seen(Vec<String>);

    fn record_changes(mut ev: EventReader<ConversationChanged>, mut seen: ResMut<Seen>) {
        for change in ev.read() {
            seen.0.push(match change {
                ConversationChanged::MessageAppended(m) => format!("message:{}", m.content()),
                ConversationChanged::DraftChanged(d) => format!("draft:{d}"),
                ConversationChanged::StatusChanged(s) => format!("status:{s}"),
            });
        }
    }

    #[test]
    fn store_changes_are_published_as_events() {
        let session = Arc::new(ScriptedSession::replying(["pong"]));
        let mut app = chat_app(ScriptedModel::available(session), ChatConfig::default());
        app.init_resource::<Seen>();
        app.add_systems(Update, record_changes.after(ChatSet::Publish));
        assert!(update_until(&mut app, |w| w.resource::<ChatController>().is_ready()));

        set_draft(&mut app, "ping");
        send(&mut app);
        assert!(update_until(&mut app, |w| w.resource::<ConversationStore>().messages().len() == 2));
        app.update();

        assert_eq!(
            app.world().resource::<Seen>().0,
            vec![
                "status:Model ready.",
                "draft:ping",
                "message:ping",
                "draft:",
                "message:pong",
            ]
        );
    }
}
