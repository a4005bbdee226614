//! Three-phase event bus
//!
//! Every event name owns three ordered handler slots: `before` (veto gate),
//! `on` (effect) and `after` (reaction). [`EventBus::emit`] runs them in that
//! order; the first `before` handler answering `false` blocks the whole
//! dispatch.

use crate::error::EventError;
use crate::logging::{DispatchLogger, TracingLogger};
use crate::payload::EventPayload;
use compact_str::CompactString;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Nested `emit` calls deeper than this on one thread are refused
pub const MAX_DISPATCH_DEPTH: usize = 16;

/// Identifier partitioning handler registrations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventName(CompactString);

impl EventName {
    pub fn new(name: &str) -> Self {
        Self(CompactString::new(name))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self(CompactString::from(name))
    }
}

impl From<&String> for EventName {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl From<&EventName> for EventName {
    fn from(name: &EventName) -> Self {
        name.clone()
    }
}

/// Dispatch phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    On,
    After,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Before, Phase::On, Phase::After];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::On => "on",
            Phase::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about the dispatch a handler is running in
#[derive(Debug, Clone, Copy)]
pub struct Dispatch<'a> {
    pub id: Uuid,
    pub event: &'a EventName,
    pub phase: Phase,
    /// 0 for a top-level emit, 1 for an emit made from inside a handler, ...
    pub depth: usize,
}

/// Type-erased handler stored by the bus.
///
/// `Ok(false)` vetoes in `before` and reports failure in `on`. `Err` and panics
/// are treated as `Ok(false)` after being logged.
pub type Handler = dyn Fn(&Dispatch<'_>, &EventPayload) -> Result<bool, EventError> + Send + Sync;

#[derive(Clone)]
struct HandlerRecord {
    id: u64,
    owner: Option<CompactString>,
    handler: Arc<Handler>,
}

impl HandlerRecord {
    fn owner_label(&self) -> &str {
        self.owner.as_deref().unwrap_or("anonymous")
    }
}

type Slot = SmallVec<[HandlerRecord; 4]>;

#[derive(Clone, Default)]
struct PhaseSlots {
    before: Slot,
    on: Slot,
    after: Slot,
}

impl PhaseSlots {
    fn slot(&self, phase: Phase) -> &Slot {
        match phase {
            Phase::Before => &self.before,
            Phase::On => &self.on,
            Phase::After => &self.after,
        }
    }

    fn slot_mut(&mut self, phase: Phase) -> &mut Slot {
        match phase {
            Phase::Before => &mut self.before,
            Phase::On => &mut self.on,
            Phase::After => &mut self.after,
        }
    }

    fn len(&self) -> usize {
        self.before.len() + self.on.len() + self.after.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One handler that failed during a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub phase: Phase,
    pub owner: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No handler is registered for the event name
    Unhandled,
    /// A `before` handler vetoed (or the dispatch was refused outright)
    Blocked,
    /// Not blocked; `after` ran only if some `on` handler did. See the counters
    Completed,
}

/// Result of one [`EventBus::emit`]
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub id: Uuid,
    pub event: EventName,
    pub outcome: DispatchOutcome,
    /// Owner of the `before` handler that blocked, if any
    pub blocked_by: Option<String>,
    pub on_succeeded: usize,
    pub on_failed: usize,
    pub after_failed: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    fn new(id: Uuid, event: EventName) -> Self {
        Self {
            id,
            event,
            outcome: DispatchOutcome::Unhandled,
            blocked_by: None,
            on_succeeded: 0,
            on_failed: 0,
            after_failed: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.outcome == DispatchOutcome::Blocked
    }

    pub fn is_handled(&self) -> bool {
        self.outcome != DispatchOutcome::Unhandled
    }

    /// Not blocked, at least one `on` handler succeeded and none failed
    pub fn succeeded(&self) -> bool {
        self.outcome == DispatchOutcome::Completed && self.on_succeeded > 0 && self.on_failed == 0
    }
}

/// Statistics for event system monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStats {
    pub dispatches: u64,
    pub blocked: u64,
    pub unhandled: u64,
    pub handler_failures: u64,
    pub total_handlers: usize,
}

#[derive(Default)]
struct Counters {
    dispatches: AtomicU64,
    blocked: AtomicU64,
    unhandled: AtomicU64,
    handler_failures: AtomicU64,
}

struct BusInner {
    handlers: DashMap<EventName, PhaseSlots>,
    disabled_owners: DashSet<CompactString>,
    next_id: AtomicU64,
    logger: Arc<dyn DispatchLogger>,
    counters: Counters,
}

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Option<(Self, usize)> {
        DISPATCH_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_DISPATCH_DEPTH {
                None
            } else {
                depth.set(current + 1);
                Some((DepthGuard, current))
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn panic_message(panic_info: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Publish/subscribe hub with before/on/after slots per event name.
///
/// Cheap to clone; clones share the same registrations.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Non-owning handle to an [`EventBus`], used by handlers that emit
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }

    /// Emit through the bus if it is still alive
    pub fn emit(
        &self,
        event: impl Into<EventName>,
        payload: impl Into<EventPayload>,
    ) -> Option<DispatchReport> {
        self.upgrade().map(|bus| bus.emit(event, payload))
    }
}

/// Capability returned by [`EventBus::on`] that removes exactly that registration
pub struct Subscription {
    bus: WeakEventBus,
    event: EventName,
    phase: Phase,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the registration. Returns `true` only on the call that removed it.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.bus.upgrade() {
            Some(bus) => bus.remove_handler(&self.event, self.phase, self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn event(&self) -> &EventName {
        &self.event
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("phase", &self.phase)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus logging through `tracing`
    pub fn new() -> Self {
        Self::with_logger(Arc::new(TracingLogger::new()))
    }

    /// Create a bus with an injected logger
    pub fn with_logger(logger: Arc<dyn DispatchLogger>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: DashMap::new(),
                disabled_owners: DashSet::new(),
                next_id: AtomicU64::new(1),
                logger,
                counters: Counters::default(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn logger(&self) -> Arc<dyn DispatchLogger> {
        self.inner.logger.clone()
    }

    /// Register `handler` for `(event, phase)`
    pub fn on<F>(
        &self,
        event: impl Into<EventName>,
        phase: Phase,
        handler: F,
    ) -> Result<Subscription, EventError>
    where
        F: Fn(&Dispatch<'_>, &EventPayload) -> Result<bool, EventError> + Send + Sync + 'static,
    {
        self.insert(event.into(), phase, None, Arc::new(handler))
    }

    /// Register a handler tagged with `owner`, removable in bulk with [`remove_owner`](Self::remove_owner)
    pub fn on_owned<F>(
        &self,
        owner: &str,
        event: impl Into<EventName>,
        phase: Phase,
        handler: F,
    ) -> Result<Subscription, EventError>
    where
        F: Fn(&Dispatch<'_>, &EventPayload) -> Result<bool, EventError> + Send + Sync + 'static,
    {
        self.insert(event.into(), phase, Some(CompactString::new(owner)), Arc::new(handler))
    }

    pub(crate) fn on_owned_arc(
        &self,
        owner: &str,
        event: EventName,
        phase: Phase,
        handler: Arc<Handler>,
    ) -> Result<Subscription, EventError> {
        self.insert(event, phase, Some(CompactString::new(owner)), handler)
    }

    fn insert(
        &self,
        event: EventName,
        phase: Phase,
        owner: Option<CompactString>,
        handler: Arc<Handler>,
    ) -> Result<Subscription, EventError> {
        if event.is_blank() {
            return Err(EventError::InvalidEventName(event.to_string()));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let record = HandlerRecord { id, owner, handler };
        let owner_label = record.owner_label().to_string();

        self.inner
            .handlers
            .entry(event.clone())
            .or_default()
            .slot_mut(phase)
            .push(record);

        self.inner.logger.debug(
            "bus",
            Some(event.as_str()),
            &format!("registered {} handler #{} for {}", phase, id, owner_label),
        );

        Ok(Subscription {
            bus: self.downgrade(),
            event,
            phase,
            id,
            active: AtomicBool::new(true),
        })
    }

    /// Remove a registration through its capability; same as `subscription.unsubscribe()`
    pub fn off(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    fn remove_handler(&self, event: &EventName, phase: Phase, id: u64) -> bool {
        let removed = match self.inner.handlers.get_mut(event) {
            Some(mut slots) => {
                let slot = slots.slot_mut(phase);
                let before = slot.len();
                slot.retain(|record| record.id != id);
                slot.len() != before
            }
            None => false,
        };
        self.inner.handlers.remove_if(event, |_, slots| slots.is_empty());
        removed
    }

    /// Remove every handler registered under `owner`; returns how many went away
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut removed = 0;
        for mut entry in self.inner.handlers.iter_mut() {
            for phase in Phase::ALL {
                let slot = entry.value_mut().slot_mut(phase);
                let before = slot.len();
                slot.retain(|record| record.owner.as_deref() != Some(owner));
                removed += before - slot.len();
            }
        }
        self.inner.handlers.retain(|_, slots| !slots.is_empty());
        if removed > 0 {
            self.inner
                .logger
                .debug("bus", None, &format!("removed {} handlers owned by {}", removed, owner));
        }
        removed
    }

    /// Skip (or stop skipping) every handler owned by `owner`
    pub fn set_owner_enabled(&self, owner: &str, enabled: bool) {
        if enabled {
            self.inner.disabled_owners.remove(owner);
        } else {
            self.inner.disabled_owners.insert(CompactString::new(owner));
        }
    }

    pub fn is_owner_enabled(&self, owner: &str) -> bool {
        !self.inner.disabled_owners.contains(owner)
    }

    fn is_record_enabled(&self, record: &HandlerRecord) -> bool {
        match &record.owner {
            Some(owner) => !self.inner.disabled_owners.contains(owner.as_str()),
            None => true,
        }
    }

    /// Number of handlers for `(event, phase)`
    pub fn handler_count(&self, event: &str, phase: Phase) -> usize {
        self.inner
            .handlers
            .get(&EventName::new(event))
            .map(|slots| slots.slot(phase).len())
            .unwrap_or(0)
    }

    /// Owners of the handlers in `(event, phase)`, in registration order
    pub fn owners(&self, event: &str, phase: Phase) -> Vec<Option<String>> {
        self.inner
            .handlers
            .get(&EventName::new(event))
            .map(|slots| {
                slots
                    .slot(phase)
                    .iter()
                    .map(|record| record.owner.as_ref().map(|o| o.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_handlers(&self, event: &str) -> bool {
        self.inner.handlers.contains_key(&EventName::new(event))
    }

    /// All event names with at least one handler, sorted
    pub fn registered_events(&self) -> Vec<EventName> {
        let mut events: Vec<EventName> =
            self.inner.handlers.iter().map(|entry| entry.key().clone()).collect();
        events.sort();
        events
    }

    pub fn total_handlers(&self) -> usize {
        self.inner.handlers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn stats(&self) -> EventStats {
        let counters = &self.inner.counters;
        EventStats {
            dispatches: counters.dispatches.load(Ordering::Relaxed),
            blocked: counters.blocked.load(Ordering::Relaxed),
            unhandled: counters.unhandled.load(Ordering::Relaxed),
            handler_failures: counters.handler_failures.load(Ordering::Relaxed),
            total_handlers: self.total_handlers(),
        }
    }

    /// Emit with an empty payload
    pub fn trigger(&self, event: impl Into<EventName>) -> DispatchReport {
        self.emit(event, EventPayload::new())
    }

    /// Run the before/on/after protocol for `event`
    pub fn emit(
        &self,
        event: impl Into<EventName>,
        payload: impl Into<EventPayload>,
    ) -> DispatchReport {
        let event = event.into();
        let payload = payload.into();
        let logger = &self.inner.logger;
        let counters = &self.inner.counters;

        let mut report = DispatchReport::new(Uuid::new_v4(), event.clone());
        counters.dispatches.fetch_add(1, Ordering::Relaxed);

        let Some((_guard, depth)) = DepthGuard::enter() else {
            let err = EventError::RecursionLimit {
                event: event.to_string(),
                depth: MAX_DISPATCH_DEPTH,
            };
            logger.error("bus", Some(event.as_str()), &err.to_string());
            report.outcome = DispatchOutcome::Blocked;
            report.failures.push(HandlerFailure {
                phase: Phase::Before,
                owner: None,
                reason: err.to_string(),
            });
            counters.blocked.fetch_add(1, Ordering::Relaxed);
            return report;
        };

        // Snapshot so handlers may (un)subscribe without touching this dispatch
        let snapshot = self.inner.handlers.get(&event).map(|entry| entry.value().clone());
        let Some(slots) = snapshot else {
            logger.debug("bus", Some(event.as_str()), "no handlers registered");
            counters.unhandled.fetch_add(1, Ordering::Relaxed);
            return report;
        };

        for record in slots.slot(Phase::Before) {
            if !self.is_record_enabled(record) {
                continue;
            }
            let dispatch = Dispatch { id: report.id, event: &event, phase: Phase::Before, depth };
            match self.invoke(record, &dispatch, &payload) {
                Ok(true) => {}
                Ok(false) => {
                    logger.warn(
                        "bus",
                        Some(event.as_str()),
                        &format!("dispatch vetoed by {}", record.owner_label()),
                    );
                    report.blocked_by = Some(record.owner_label().to_string());
                    break;
                }
                Err(e) => {
                    logger.error(
                        record.owner_label(),
                        Some(event.as_str()),
                        &format!("before handler failed: {}", e),
                    );
                    report.failures.push(HandlerFailure {
                        phase: Phase::Before,
                        owner: record.owner.as_ref().map(|o| o.to_string()),
                        reason: e.to_string(),
                    });
                    report.blocked_by = Some(record.owner_label().to_string());
                    break;
                }
            }
        }

        if report.blocked_by.is_some() {
            report.outcome = DispatchOutcome::Blocked;
            counters.blocked.fetch_add(1, Ordering::Relaxed);
            counters
                .handler_failures
                .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
            return report;
        }

        report.outcome = DispatchOutcome::Completed;

        let mut on_invoked = 0usize;
        for record in slots.slot(Phase::On) {
            if !self.is_record_enabled(record) {
                continue;
            }
            on_invoked += 1;
            let dispatch = Dispatch { id: report.id, event: &event, phase: Phase::On, depth };
            let reason = match self.invoke(record, &dispatch, &payload) {
                Ok(true) => {
                    report.on_succeeded += 1;
                    continue;
                }
                Ok(false) => "handler reported failure".to_string(),
                Err(e) => e.to_string(),
            };
            logger.error(
                record.owner_label(),
                Some(event.as_str()),
                &format!("on handler failed: {}", reason),
            );
            report.on_failed += 1;
            report.failures.push(HandlerFailure {
                phase: Phase::On,
                owner: record.owner.as_ref().map(|o| o.to_string()),
                reason,
            });
        }

        // `after` reacts to an effect, so it needs at least one `on` handler to have run
        let after_slot: &[HandlerRecord] = if on_invoked > 0 {
            slots.slot(Phase::After)
        } else {
            if slots.slot(Phase::After).iter().any(|r| self.is_record_enabled(r)) {
                logger.debug("bus", Some(event.as_str()), "no on handler ran, after skipped");
            }
            &[]
        };

        for record in after_slot {
            if !self.is_record_enabled(record) {
                continue;
            }
            let dispatch = Dispatch { id: report.id, event: &event, phase: Phase::After, depth };
            if let Err(e) = self.invoke(record, &dispatch, &payload) {
                logger.error(
                    record.owner_label(),
                    Some(event.as_str()),
                    &format!("after handler failed: {}", e),
                );
                report.after_failed += 1;
                report.failures.push(HandlerFailure {
                    phase: Phase::After,
                    owner: record.owner.as_ref().map(|o| o.to_string()),
                    reason: e.to_string(),
                });
            }
        }

        counters
            .handler_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
        logger.debug(
            "bus",
            Some(event.as_str()),
            &format!(
                "dispatch {} complete: {} on ok, {} on failed, {} after failed",
                report.id, report.on_succeeded, report.on_failed, report.after_failed
            ),
        );
        report
    }

    fn invoke(
        &self,
        record: &HandlerRecord,
        dispatch: &Dispatch<'_>,
        payload: &EventPayload,
    ) -> Result<bool, EventError> {
        match catch_unwind(AssertUnwindSafe(|| (record.handler)(dispatch, payload))) {
            Ok(result) => result,
            Err(panic_info) => Err(EventError::HandlerPanicked(panic_message(panic_info))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullLogger;
    use serde_json::json;
    use std::sync::Mutex;

    fn quiet_bus() -> EventBus {
        EventBus::with_logger(Arc::new(NullLogger))
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn() + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |label: &str| {
            let log = log_clone.clone();
            let label = label.to_string();
            Box::new(move || log.lock().unwrap().push(label.clone())) as Box<dyn Fn() + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn test_phases_run_in_order() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        for phase in [Phase::After, Phase::On, Phase::Before] {
            let hit = mark(phase.as_str());
            bus.on("BOLD_CLICKED", phase, move |_, _| {
                hit();
                Ok(true)
            })
            .unwrap();
        }

        let report = bus.trigger("BOLD_CLICKED");
        assert!(report.succeeded());
        assert_eq!(*log.lock().unwrap(), vec!["before", "on", "after"]);
    }

    #[test]
    fn test_veto_blocks_on_and_after() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        let hit = mark("first-before");
        bus.on("E", Phase::Before, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();
        bus.on_owned("guard", "E", Phase::Before, |_, _| Ok(false)).unwrap();
        let hit = mark("on");
        bus.on("E", Phase::On, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();
        let hit = mark("after");
        bus.on("E", Phase::After, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();

        let report = bus.trigger("E");
        assert!(report.is_blocked());
        assert_eq!(report.blocked_by.as_deref(), Some("guard"));
        assert_eq!(report.on_succeeded, 0);
        assert_eq!(*log.lock().unwrap(), vec!["first-before"]);
        assert_eq!(bus.stats().blocked, 1);
    }

    #[test]
    fn test_handler_order_is_registration_order() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        bus.on("OTHER", Phase::On, |_, _| Ok(true)).unwrap();
        for label in ["h1", "h2", "h3"] {
            let hit = mark(label);
            bus.on("E", Phase::On, move |_, _| {
                hit();
                Ok(true)
            })
            .unwrap();
            bus.on("UNRELATED", Phase::Before, |_, _| Ok(true)).unwrap();
        }

        for _ in 0..3 {
            bus.trigger("E");
        }
        let seen = log.lock().unwrap().clone();
        assert_eq!(seen, ["h1", "h2", "h3"].repeat(3));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        let hit = mark("removed");
        let sub = bus
            .on("E", Phase::On, move |_, _| {
                hit();
                Ok(true)
            })
            .unwrap();
        let hit = mark("kept");
        let _keep = bus
            .on("E", Phase::On, move |_, _| {
                hit();
                Ok(true)
            })
            .unwrap();

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!bus.off(&sub));
        assert!(!sub.is_active());

        bus.trigger("E");
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
        assert_eq!(bus.handler_count("E", Phase::On), 1);
    }

    #[test]
    fn test_unsubscribe_last_handler_clears_event() {
        let bus = quiet_bus();
        let sub = bus.on("E", Phase::After, |_, _| Ok(true)).unwrap();
        assert!(bus.has_handlers("E"));
        sub.unsubscribe();
        assert!(!bus.has_handlers("E"));
        assert!(!bus.trigger("E").is_handled());
    }

    #[test]
    fn test_on_failure_does_not_abort_siblings_or_after() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        bus.on_owned("failing", "E", Phase::On, |_, _| Ok(false)).unwrap();
        bus.on_owned("erroring", "E", Phase::On, |_, _| {
            Err(EventError::HandlerExecutionFailed("boom".into()))
        })
        .unwrap();
        let hit = mark("sibling");
        bus.on("E", Phase::On, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();
        let hit = mark("after");
        bus.on("E", Phase::After, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();

        let report = bus.trigger("E");
        assert!(!report.is_blocked());
        assert!(!report.succeeded());
        assert_eq!(report.on_succeeded, 1);
        assert_eq!(report.on_failed, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].owner.as_deref(), Some("failing"));
        assert_eq!(*log.lock().unwrap(), vec!["sibling", "after"]);
    }

    #[test]
    fn test_after_skipped_when_no_on_handler_ran() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        bus.on_owned("bold", "BOLD_CLICKED", Phase::On, |_, _| Ok(true)).unwrap();
        let hit = mark("after");
        bus.on("BOLD_CLICKED", Phase::After, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();
        let hit = mark("orphan-after");
        bus.on("NO_EFFECT", Phase::After, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();
        bus.on("NO_EFFECT", Phase::Before, |_, _| Ok(true)).unwrap();

        bus.set_owner_enabled("bold", false);
        let report = bus.trigger("BOLD_CLICKED");
        assert_eq!(report.outcome, DispatchOutcome::Completed);
        assert_eq!(report.on_succeeded + report.on_failed, 0);

        let report = bus.trigger("NO_EFFECT");
        assert_eq!(report.outcome, DispatchOutcome::Completed);
        assert!(log.lock().unwrap().is_empty());

        bus.set_owner_enabled("bold", true);
        assert!(bus.trigger("BOLD_CLICKED").succeeded());
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_panicking_handlers_are_contained() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        bus.on_owned("panicky", "E", Phase::On, |_, _| panic!("handler bug")).unwrap();
        bus.on("E", Phase::After, |_, _| panic!("after bug")).unwrap();
        let hit = mark("after-ok");
        bus.on("E", Phase::After, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();

        let report = bus.trigger("E");
        assert_eq!(report.on_failed, 1);
        assert_eq!(report.after_failed, 1);
        assert!(report.failures[0].reason.contains("handler bug"));
        assert_eq!(*log.lock().unwrap(), vec!["after-ok"]);

        bus.on_owned("panicky-guard", "G", Phase::Before, |_, _| panic!("guard bug")).unwrap();
        let report = bus.trigger("G");
        assert!(report.is_blocked());
        assert_eq!(report.blocked_by.as_deref(), Some("panicky-guard"));
    }

    #[test]
    fn test_remove_owner_and_disable() {
        let bus = quiet_bus();
        let (log, mark) = recorder();

        bus.on_owned("bold", "E", Phase::Before, |_, _| Ok(false)).unwrap();
        bus.on_owned("bold", "F", Phase::On, |_, _| Ok(true)).unwrap();
        let hit = mark("other");
        bus.on_owned("other", "E", Phase::On, move |_, _| {
            hit();
            Ok(true)
        })
        .unwrap();

        bus.set_owner_enabled("bold", false);
        assert!(!bus.is_owner_enabled("bold"));
        assert!(!bus.trigger("E").is_blocked());

        bus.set_owner_enabled("bold", true);
        assert!(bus.trigger("E").is_blocked());

        assert_eq!(bus.remove_owner("bold"), 2);
        assert_eq!(bus.remove_owner("bold"), 0);
        assert!(!bus.has_handlers("F"));
        assert_eq!(bus.owners("E", Phase::On), vec![Some("other".to_string())]);
        assert!(bus.trigger("E").succeeded());
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_event_name_rejected() {
        assert!(EventName::new(" \t").is_blank());
        assert!(!EventName::new(" E ").is_blank());

        let bus = quiet_bus();
        let err = bus.on("  ", Phase::On, |_, _| Ok(true)).unwrap_err();
        assert!(matches!(err, EventError::InvalidEventName(_)));
        assert_eq!(bus.total_handlers(), 0);
    }

    #[test]
    fn test_handlers_may_emit_follow_up_events() {
        let bus = quiet_bus();
        let weak = bus.downgrade();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.on("CLICK", Phase::On, move |dispatch, _| {
            let report = weak.emit("CHANGED", json!({ "depth": dispatch.depth }));
            Ok(report.map(|r| r.succeeded()).unwrap_or(false))
        })
        .unwrap();
        let seen_clone = seen.clone();
        bus.on("CHANGED", Phase::On, move |dispatch, payload| {
            seen_clone.lock().unwrap().push((dispatch.depth, payload.number_field("depth")));
            Ok(true)
        })
        .unwrap();

        assert!(bus.trigger("CLICK").succeeded());
        assert_eq!(*seen.lock().unwrap(), vec![(1, Some(0.0))]);
    }

    #[test]
    fn test_subscribing_during_dispatch_does_not_affect_it() {
        let bus = quiet_bus();
        let bus_clone = bus.clone();
        let late_calls = Arc::new(AtomicU64::new(0));
        let late_clone = late_calls.clone();

        bus.on("E", Phase::On, move |_, _| {
            let late = late_clone.clone();
            bus_clone
                .on("E", Phase::On, move |_, _| {
                    late.fetch_add(1, Ordering::Relaxed);
                    Ok(true)
                })
                .map(|_| true)
        })
        .unwrap();

        assert_eq!(bus.trigger("E").on_succeeded, 1);
        assert_eq!(late_calls.load(Ordering::Relaxed), 0);
        bus.trigger("E");
        assert_eq!(late_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_runaway_recursion_is_refused() {
        let bus = quiet_bus();
        let weak = bus.downgrade();
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();

        bus.on("LOOP", Phase::On, move |_, _| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            Ok(weak.emit("LOOP", EventPayload::new()).map(|r| !r.is_blocked()).unwrap_or(false))
        })
        .unwrap();

        let report = bus.trigger("LOOP");
        assert!(report.is_handled());
        assert_eq!(calls.load(Ordering::Relaxed), MAX_DISPATCH_DEPTH as u64);

        // depth is restored afterwards
        bus.on("PLAIN", Phase::On, |d, _| Ok(d.depth == 0)).unwrap();
        assert!(bus.trigger("PLAIN").succeeded());
    }

    #[test]
    fn test_stats_and_registered_events() {
        let bus = quiet_bus();
        bus.on("B", Phase::On, |_, _| Ok(true)).unwrap();
        bus.on("A", Phase::Before, |_, _| Ok(true)).unwrap();
        bus.on("A", Phase::On, |_, _| Ok(false)).unwrap();

        bus.trigger("A");
        bus.trigger("B");
        bus.trigger("MISSING");

        let stats = bus.stats();
        assert_eq!(stats.dispatches, 3);
        assert_eq!(stats.unhandled, 1);
        assert_eq!(stats.handler_failures, 1);
        assert_eq!(stats.total_handlers, 3);
        assert_eq!(bus.registered_events(), vec![EventName::new("A"), EventName::new("B")]);
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus = quiet_bus();
        let sub = bus.on("E", Phase::On, |_, _| Ok(true)).unwrap();
        drop(bus);
        assert!(!sub.unsubscribe());
    }
}
