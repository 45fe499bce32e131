//! The orchestrator: agent registry, message routing and observation.
//!
//! `dispatch` never waits for an agent. It notifies listeners, publishes the
//! message on the broadcast tap, and drops it into the target's bounded
//! mailbox. The only external entry point that waits is
//! [`Orchestrator::process_request`], which correlates replies by plan id.

use agentbus_config::BusConfig;
use agentbus_core::error::BusError;
use agentbus_core::message::{
    ActionName, AgentKind, Context, Message, MessageDraft, MessageKind, PlanId,
};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::HandlerRegistry;
use crate::runtime::{AgentRuntime, AgentStatus, StatusCell};

/// An actor on the bus.
pub trait Agent: Send + Sync + 'static {
    fn kind(&self) -> AgentKind;

    /// Install this agent's handlers. Called once, on registration.
    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry);
}

/// Synchronous observer of every dispatched message.
pub type Listener = Arc<dyn Fn(&Arc<Message>) + Send + Sync>;

/// What happened to a dispatched message.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Addressed to the orchestrator; listeners consumed it.
    Observed,
    /// Queued in the target agent's mailbox.
    Delivered,
    /// The target is registered but could not take the message.
    Rejected(BusError),
    /// No agent is registered for the target; the message was dropped.
    Undeliverable(AgentKind),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Observed | Delivery::Delivered)
    }

    pub fn into_result(self) -> Result<(), BusError> {
        match self {
            Delivery::Observed | Delivery::Delivered => Ok(()),
            Delivery::Rejected(e) => Err(e),
            Delivery::Undeliverable(kind) => Err(BusError::UnknownAgent(kind)),
        }
    }
}

/// Options for [`Orchestrator::process_request_with`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// `None` waits until a reply arrives or `cancel` fires.
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

struct AgentSlot {
    id: String,
    mailbox: mpsc::Sender<Arc<Message>>,
    status: Arc<StatusCell>,
    actions: Vec<ActionName>,
}

pub(crate) struct BusInner {
    agents: RwLock<HashMap<AgentKind, AgentSlot>>,
    listeners: RwLock<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    events: broadcast::Sender<Arc<Message>>,
    dead_letters: AtomicU64,
    /// Cancellation of every plan with a caller still waiting on it.
    plans: Mutex<HashMap<PlanId, CancellationToken>>,
    mailbox_capacity: usize,
    request_timeout: Option<Duration>,
}

impl BusInner {
    fn plans(&self) -> std::sync::MutexGuard<'_, HashMap<PlanId, CancellationToken>> {
        self.plans.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to a message bus. Clones share the same bus.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<BusInner>,
}

impl Orchestrator {
    pub fn new(config: &BusConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                agents: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                events,
                dead_letters: AtomicU64::new(0),
                plans: Mutex::new(HashMap::new()),
                mailbox_capacity: config.mailbox_capacity.max(1),
                request_timeout: config.request_timeout(),
            }),
        }
    }

    /// Register an agent under its kind and start its mailbox loop.
    ///
    /// A later registration for the same kind replaces the earlier one; the
    /// old loop finishes what is already queued and stops. Must be called
    /// from within a Tokio runtime. Returns the new agent's id.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> String {
        let kind = agent.kind();
        let mut handlers = HandlerRegistry::new();
        agent.register(&mut handlers);
        let actions = handlers.actions();

        let (tx, rx) = mpsc::channel(self.inner.mailbox_capacity);
        let status = Arc::new(StatusCell::new(AgentStatus::Idle));
        let id = uuid::Uuid::new_v4().to_string();

        let runtime = AgentRuntime {
            kind,
            handlers,
            status: status.clone(),
            outbox: Outbox {
                kind,
                bus: Arc::downgrade(&self.inner),
                status: Some(status.clone()),
            },
        };
        tokio::spawn(runtime.run(rx));

        let slot = AgentSlot {
            id: id.clone(),
            mailbox: tx,
            status,
            actions: actions.clone(),
        };
        let previous = self.write_agents().insert(kind, slot);
        if let Some(previous) = previous {
            info!(agent = %kind, replaced = %previous.id, "Agent re-registered");
        }
        info!(agent = %kind, id = %id, actions = ?actions, "Agent registered");
        id
    }

    /// Route a message. Never blocks and never fails loudly.
    pub fn dispatch(&self, message: impl Into<Arc<Message>>) -> Delivery {
        let message = message.into();
        debug!(
            from = %message.from,
            to = %message.to,
            kind = ?message.kind,
            action = %message.action(),
            "Dispatching message"
        );

        for listener in self.listener_snapshot() {
            listener(&message);
        }
        let _ = self.inner.events.send(message.clone());

        if message.to == AgentKind::Orchestrator {
            return Delivery::Observed;
        }

        let mailbox = self
            .read_agents()
            .get(&message.to)
            .map(|slot| slot.mailbox.clone());
        let Some(mailbox) = mailbox else {
            self.inner.dead_letters.fetch_add(1, Ordering::Relaxed);
            warn!(to = %message.to, action = %message.action(), "No agent registered, dropping message");
            return Delivery::Undeliverable(message.to);
        };

        let to = message.to;
        match mailbox.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                warn!(to = %to, "Mailbox full, rejecting message");
                Delivery::Rejected(BusError::MailboxFull(to))
            }
            Err(TrySendError::Closed(_)) => {
                warn!(to = %to, "Mailbox closed, rejecting message");
                Delivery::Rejected(BusError::MailboxClosed(to))
            }
        }
    }

    /// Call `listener` synchronously for every dispatched message until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<Message>) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Async tap of every dispatched message.
    pub fn events(&self) -> broadcast::Receiver<Arc<Message>> {
        self.inner.events.subscribe()
    }

    /// Send `prompt` to the generative agent and wait for its result, using
    /// the configured request timeout.
    pub async fn process_request(&self, prompt: impl Into<String>) -> Result<String, BusError> {
        let options = RequestOptions {
            timeout: self.inner.request_timeout,
            cancel: CancellationToken::new(),
        };
        self.process_request_with(prompt, options).await
    }

    /// Send `prompt` to the generative agent and wait for the matching
    /// `task_completed` response or `error` message.
    ///
    /// On deadline or cancellation an `error` message for the plan is
    /// dispatched so observers see why the request ended, and the plan's
    /// token fires: handlers still working on the plan are dropped and their
    /// pending approvals withdrawn.
    pub async fn process_request_with(
        &self,
        prompt: impl Into<String>,
        options: RequestOptions,
    ) -> Result<String, BusError> {
        let plan_id = PlanId::generate();
        let plan = PlanScope::open(&self.inner, plan_id.clone(), options.cancel.child_token());
        let (tx, rx) = oneshot::channel();
        let resolver = Mutex::new(Some(tx));

        let watched = plan_id.clone();
        let subscription = self.subscribe(move |message| {
            if !message.payload.context.belongs_to(&watched) {
                return;
            }
            let outcome = match message.kind {
                MessageKind::Response
                    if message.from == AgentKind::GenerativeAi
                        && message.action() == ActionName::TaskCompleted =>
                {
                    Ok(message.data_str("result").unwrap_or_default().to_string())
                }
                MessageKind::Error => Err(BusError::Remote(
                    message.data_str("error").unwrap_or("unknown error").to_string(),
                )),
                _ => return,
            };
            let sender = resolver.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(sender) = sender {
                let _ = sender.send(outcome);
            }
        });

        info!(plan_id = %plan_id, "Processing request");
        let request = MessageDraft::request(
            AgentKind::GenerativeAi,
            ActionName::GenerateCode,
            json!({ "prompt": prompt.into() }),
            Context::for_plan(plan_id.clone()),
        )
        .stamp(AgentKind::Orchestrator);

        if let Err(e) = self.dispatch(request).into_result() {
            warn!(plan_id = %plan_id, "Request could not be delivered: {e}");
            return Err(e);
        }

        let outcome = tokio::select! {
            result = rx => result.unwrap_or(Err(BusError::Closed)),
            _ = options.cancel.cancelled() => Err(self.abandon(&plan, BusError::Cancelled)),
            _ = deadline(options.timeout) => {
                let secs = options.timeout.map(|t| t.as_secs()).unwrap_or_default();
                Err(self.abandon(&plan, BusError::Timeout(secs)))
            }
        };

        drop(subscription);
        drop(plan);
        match &outcome {
            Ok(_) => info!(plan_id = %plan_id, "Request completed"),
            Err(e) => warn!(plan_id = %plan_id, "Request failed: {e}"),
        }
        outcome
    }

    /// Publish the synthetic `error` message for a plan that was given up on
    /// and stop whatever is still working on it.
    fn abandon(&self, plan: &PlanScope, reason: BusError) -> BusError {
        let notice = MessageDraft::error(
            AgentKind::Orchestrator,
            json!({ "error": reason.to_string() }),
            Context::for_plan(plan.id.clone()),
        )
        .stamp(AgentKind::Orchestrator);
        self.dispatch(notice);
        plan.token.cancel();
        reason
    }

    /// Plans that still have a caller waiting in `process_request`.
    pub fn active_plans(&self) -> usize {
        self.inner.plans().len()
    }

    /// Registered agent kinds, sorted.
    pub fn agent_kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.read_agents().keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_registered(&self, kind: AgentKind) -> bool {
        self.read_agents().contains_key(&kind)
    }

    pub fn agent_id(&self, kind: AgentKind) -> Option<String> {
        self.read_agents().get(&kind).map(|slot| slot.id.clone())
    }

    /// Actions the agent registered handlers for.
    pub fn agent_actions(&self, kind: AgentKind) -> Vec<ActionName> {
        self.read_agents()
            .get(&kind)
            .map(|slot| slot.actions.clone())
            .unwrap_or_default()
    }

    pub fn status(&self, kind: AgentKind) -> Option<AgentStatus> {
        self.read_agents().get(&kind).map(|slot| slot.status.get())
    }

    pub fn statuses(&self) -> BTreeMap<AgentKind, AgentStatus> {
        self.read_agents()
            .iter()
            .map(|(kind, slot)| (*kind, slot.status.get()))
            .collect()
    }

    /// Messages dropped because their target was not registered.
    pub fn dead_letters(&self) -> u64 {
        self.inner.dead_letters.load(Ordering::Relaxed)
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Unregister every agent. Their loops finish queued messages and stop.
    pub fn shutdown(&self) {
        let removed = std::mem::take(&mut *self.write_agents());
        info!(agents = removed.len(), "Bus shut down");
    }

    fn listener_snapshot(&self) -> Vec<Listener> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    fn read_agents(&self) -> std::sync::RwLockReadGuard<'_, HashMap<AgentKind, AgentSlot>> {
        self.inner.agents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_agents(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<AgentKind, AgentSlot>> {
        self.inner.agents.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(&BusConfig::default())
    }
}

/// Registers a plan's token for the lifetime of one request.
struct PlanScope {
    id: PlanId,
    token: CancellationToken,
    bus: Weak<BusInner>,
}

impl PlanScope {
    fn open(inner: &Arc<BusInner>, id: PlanId, token: CancellationToken) -> Self {
        inner.plans().insert(id.clone(), token.clone());
        Self {
            id,
            token,
            bus: Arc::downgrade(inner),
        }
    }
}

impl Drop for PlanScope {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.plans().remove(&self.id);
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

/// Keeps a listener attached. Dropping it (or calling
/// [`Subscription::unsubscribe`]) removes the listener.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner
                .listeners
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// An agent's way back onto the bus.
///
/// Stamps `from`, id and timestamp on every draft. Holds the bus weakly, so
/// agents never keep a shut-down bus alive.
#[derive(Clone)]
pub struct Outbox {
    kind: AgentKind,
    bus: Weak<BusInner>,
    status: Option<Arc<StatusCell>>,
}

impl Outbox {
    /// An outbox that sends as `kind` on `bus`, outside any agent runtime.
    pub fn new(bus: &Orchestrator, kind: AgentKind) -> Self {
        Self {
            kind,
            bus: Arc::downgrade(&bus.inner),
            status: None,
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn send(&self, draft: MessageDraft) -> Delivery {
        match self.bus.upgrade() {
            Some(inner) => Orchestrator { inner }.dispatch(draft.stamp(self.kind)),
            None => Delivery::Rejected(BusError::Closed),
        }
    }

    pub fn reply(&self, to: AgentKind, action: ActionName, data: Value, context: Context) -> Delivery {
        self.send(MessageDraft::response(to, action, data, context))
    }

    pub fn notify(&self, to: AgentKind, action: ActionName, data: Value, context: Context) -> Delivery {
        self.send(MessageDraft::notification(to, action, data, context))
    }

    /// Token that fires when the caller gives up on the plan in `context`.
    ///
    /// Messages outside any waiting plan get a token that never fires.
    pub fn cancellation(&self, context: &Context) -> CancellationToken {
        let token = context.plan_id.as_ref().and_then(|plan_id| {
            let inner = self.bus.upgrade()?;
            inner.plans().get(plan_id).cloned()
        });
        token.unwrap_or_default()
    }

    /// Update the owning agent's status while a handler runs.
    pub fn set_status(&self, status: AgentStatus) {
        if let Some(cell) = &self.status {
            cell.set(status);
        }
    }
}
