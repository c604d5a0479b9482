//! Typed publish/subscribe hub for stockgrid.
//!
//! The hub is a registry of handlers keyed by an event's *kind*. Producers
//! call [`EventHub::emit`] with a value of a closed event type; every handler
//! registered for that kind runs, followed by every wildcard handler.
//!
//! # Key Types
//!
//! - [`EventHub<E>`] - The registry. Cloning a hub yields another handle to
//!   the *same* registry, never a second independent one.
//! - [`HubEvent`] - Implemented by event catalogs; maps a value to its kind.
//! - [`SubscriptionId`] - Opaque handle returned by every registration.
//! - [`SubscriptionGuard`] - RAII handle that deregisters when dropped.
//! - [`Emission`] - Report of a single `emit` call.
//!
//! # Emission Semantics
//!
//! - Handlers run synchronously on the emitting thread, in registration order.
//! - The handler list is snapshotted before the first handler runs. Handlers
//!   may call [`EventHub::on`] or [`EventHub::off`] re-entrantly; the change
//!   applies to the next emission only.
//! - Duplicate registrations of the same closure are independent: each fires,
//!   and removing one leaves the others active.
//! - A panicking handler is isolated: the panic is caught and logged, and the
//!   rest of the snapshot still runs. [`Emission::panicked`] reports how many
//!   handlers failed.
//!
//! # Example
//!
//! ```
//! use stockgrid_core::hub::{EventHub, HubEvent};
//!
//! #[derive(Clone, Debug)]
//! enum Ping {
//!     Hello(String),
//!     Bye,
//! }
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum PingKind {
//!     Hello,
//!     Bye,
//! }
//!
//! impl HubEvent for Ping {
//!     type Kind = PingKind;
//!
//!     fn kind(&self) -> PingKind {
//!         match self {
//!             Ping::Hello(_) => PingKind::Hello,
//!             Ping::Bye => PingKind::Bye,
//!         }
//!     }
//! }
//!
//! let hub = EventHub::<Ping>::new();
//! let id = hub.on(PingKind::Hello, |event| println!("got {event:?}"));
//! hub.on_any(|kind, _| println!("saw {kind:?}"));
//!
//! hub.emit(Ping::Hello("world".to_string()));
//! hub.emit(Ping::Bye);
//!
//! hub.off(id);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{HubError, Result};
use crate::logging::targets;

new_key_type! {
    /// A unique identifier for one hub registration.
    ///
    /// Every call to [`EventHub::on`] or [`EventHub::on_any`] returns a fresh
    /// id, even when the same closure is registered twice. Pass it to
    /// [`EventHub::off`] to remove exactly that registration.
    pub struct SubscriptionId;
}

/// An event type that can travel through an [`EventHub`].
///
/// The catalog is closed: `Kind` enumerates every event name that exists,
/// and each value reports which one it is.
pub trait HubEvent: Send + Sync + 'static {
    /// The discriminant used to route events to handlers.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Returns the kind this event is routed under.
    fn kind(&self) -> Self::Kind;
}

/// Where a registration listens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic<K> {
    /// Handlers for one event kind.
    Event(K),
    /// Handlers that receive every emission.
    Wildcard,
}

type EventHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;
type WildcardHandler<E> = Arc<dyn Fn(<E as HubEvent>::Kind, &E) + Send + Sync>;

enum Handler<E: HubEvent> {
    Event(EventHandler<E>),
    Wildcard(WildcardHandler<E>),
}

impl<E: HubEvent> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Event(handler) => Self::Event(handler.clone()),
            Self::Wildcard(handler) => Self::Wildcard(handler.clone()),
        }
    }
}

struct Subscription<E: HubEvent> {
    topic: Topic<E::Kind>,
    handler: Handler<E>,
}

struct Registry<E: HubEvent> {
    subscriptions: SlotMap<SubscriptionId, Subscription<E>>,
    /// Registration order per topic.
    order: HashMap<Topic<E::Kind>, Vec<SubscriptionId>>,
}

impl<E: HubEvent> Registry<E> {
    fn new() -> Self {
        Self {
            subscriptions: SlotMap::with_key(),
            order: HashMap::new(),
        }
    }

    fn insert(&mut self, topic: Topic<E::Kind>, handler: Handler<E>) -> SubscriptionId {
        let id = self.subscriptions.insert(Subscription { topic, handler });
        self.order.entry(topic).or_default().push(id);
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(subscription) = self.subscriptions.remove(id) else {
            return false;
        };
        if let Some(ids) = self.order.get_mut(&subscription.topic) {
            if let Some(position) = ids.iter().position(|candidate| *candidate == id) {
                ids.remove(position);
            }
            if ids.is_empty() {
                self.order.remove(&subscription.topic);
            }
        }
        true
    }

    fn snapshot(&self, topic: Topic<E::Kind>) -> Vec<Handler<E>> {
        self.order
            .get(&topic)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.subscriptions.get(*id))
                    .map(|subscription| subscription.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

struct HubInner<E: HubEvent> {
    registry: Mutex<Registry<E>>,
    blocked: AtomicBool,
    emission_counter: AtomicU64,
}

/// Outcome of one [`EventHub::emit`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Emission {
    /// Number of handlers that were invoked (including ones that panicked).
    pub invoked: usize,
    /// Number of handlers that panicked.
    pub panicked: usize,
}

impl Emission {
    /// True when every invoked handler returned normally.
    pub fn is_clean(&self) -> bool {
        self.panicked == 0
    }
}

/// A process-wide, typed publish/subscribe registry.
///
/// `EventHub` is a cheap handle: clones share the same registry. Construct one
/// at application start-up and pass it to every component that publishes or
/// listens.
///
/// # Related
///
/// - [`HubEvent`] - The trait event catalogs implement
/// - [`SubscriptionGuard`] - Scoped registrations
pub struct EventHub<E: HubEvent> {
    inner: Arc<HubInner<E>>,
}

impl<E: HubEvent> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: HubEvent> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: HubEvent> fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriptions", &self.subscription_count())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

impl<E: HubEvent> EventHub<E> {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: Mutex::new(Registry::new()),
                blocked: AtomicBool::new(false),
                emission_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Returns a fresh [`SubscriptionId`]; registering the same closure twice
    /// yields two independent registrations.
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .registry
            .lock()
            .insert(Topic::Event(kind), Handler::Event(Arc::new(handler)));
        tracing::trace!(target: targets::HUB, ?kind, ?id, "handler registered");
        id
    }

    /// Register a wildcard handler that receives every emission together with
    /// the emitted event's kind.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(E::Kind, &E) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .registry
            .lock()
            .insert(Topic::Wildcard, Handler::Wildcard(Arc::new(handler)));
        tracing::trace!(target: targets::HUB, ?id, "wildcard handler registered");
        id
    }

    /// Register `handler` for `kind`, deregistering it when the returned guard
    /// is dropped.
    pub fn on_scoped<F>(&self, kind: E::Kind, handler: F) -> SubscriptionGuard<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.on(kind, handler);
        SubscriptionGuard {
            hub: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Remove one registration.
    ///
    /// Returns `true` if the registration existed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.registry.lock().remove(id);
        tracing::trace!(target: targets::HUB, ?id, removed, "handler removed");
        removed
    }

    /// Remove one registration, reporting an unknown id as an error.
    pub fn try_off(&self, id: SubscriptionId) -> Result<()> {
        if self.off(id) {
            Ok(())
        } else {
            Err(HubError::UnknownSubscription)
        }
    }

    /// Remove every registration for `topic`.
    ///
    /// Returns the number of registrations removed.
    pub fn off_all(&self, topic: Topic<E::Kind>) -> usize {
        let mut registry = self.inner.registry.lock();
        let ids = registry.order.remove(&topic).unwrap_or_default();
        for id in &ids {
            registry.subscriptions.remove(*id);
        }
        tracing::trace!(target: targets::HUB, ?topic, removed = ids.len(), "topic cleared");
        ids.len()
    }

    /// Remove every registration on every topic.
    pub fn clear(&self) {
        let mut registry = self.inner.registry.lock();
        registry.subscriptions.clear();
        registry.order.clear();
    }

    /// Number of handlers registered on `topic`.
    pub fn handler_count(&self, topic: Topic<E::Kind>) -> usize {
        self.inner
            .registry
            .lock()
            .order
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Total number of live registrations.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.lock().subscriptions.len()
    }

    /// Whether `id` is still registered.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner.registry.lock().subscriptions.contains_key(id)
    }

    /// Topics that currently have at least one handler, with their counts.
    pub fn topics(&self) -> Vec<(Topic<E::Kind>, usize)> {
        self.inner
            .registry
            .lock()
            .order
            .iter()
            .map(|(topic, ids)| (*topic, ids.len()))
            .collect()
    }

    /// Suppress emissions while `blocked` is true.
    ///
    /// Useful during batch updates to avoid cascading notifications.
    pub fn set_blocked(&self, blocked: bool) {
        self.inner.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Whether emissions are currently suppressed.
    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.load(Ordering::SeqCst)
    }

    /// Number of emissions delivered since the hub was created.
    pub fn emission_count(&self) -> u64 {
        self.inner.emission_counter.load(Ordering::SeqCst)
    }

    /// Emit `event` to its kind's handlers, then to the wildcard handlers.
    ///
    /// Both handler lists are snapshotted before any handler runs, and the
    /// registry lock is released while handlers execute.
    #[tracing::instrument(skip_all, target = "stockgrid_core::hub", level = "trace")]
    pub fn emit(&self, event: E) -> Emission {
        if self.is_blocked() {
            tracing::trace!(target: targets::HUB, "hub blocked, skipping emit");
            return Emission::default();
        }

        let kind = event.kind();
        let (specific, wildcard) = {
            let registry = self.inner.registry.lock();
            (
                registry.snapshot(Topic::Event(kind)),
                registry.snapshot(Topic::Wildcard),
            )
        };
        self.inner.emission_counter.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            target: targets::HUB,
            ?kind,
            handlers = specific.len(),
            wildcard = wildcard.len(),
            "emitting event"
        );

        let mut emission = Emission::default();
        for handler in specific.iter().chain(wildcard.iter()) {
            emission.invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| match handler {
                Handler::Event(handler) => handler(&event),
                Handler::Wildcard(handler) => handler(kind, &event),
            }));
            if let Err(payload) = outcome {
                emission.panicked += 1;
                tracing::error!(
                    target: targets::HUB,
                    ?kind,
                    reason = panic_message(payload.as_ref()),
                    "event handler panicked"
                );
            }
        }
        emission
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// A registration that is removed from its hub when dropped.
///
/// Created via [`EventHub::on_scoped`]. The guard holds a weak reference, so
/// it never keeps the hub alive on its own.
pub struct SubscriptionGuard<E: HubEvent> {
    hub: Weak<HubInner<E>>,
    id: Option<SubscriptionId>,
}

impl<E: HubEvent> SubscriptionGuard<E> {
    /// The id of the guarded registration.
    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    /// Release the guard without deregistering, returning the id.
    pub fn detach(mut self) -> Option<SubscriptionId> {
        self.id.take()
    }
}

impl<E: HubEvent> Drop for SubscriptionGuard<E> {
    fn drop(&mut self) {
        if let (Some(id), Some(hub)) = (self.id.take(), self.hub.upgrade()) {
            hub.registry.lock().remove(id);
        }
    }
}

impl<E: HubEvent> fmt::Debug for SubscriptionGuard<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard").field("id", &self.id).finish()
    }
}
