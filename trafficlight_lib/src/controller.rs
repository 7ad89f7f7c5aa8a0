//! The phase controller and its background toggler.
//!
//! A [`PhaseController`] owns the current [`Phase`] and one [`BlockingQueue`]
//! into which every transition is published. After [`PhaseController::start`],
//! a dedicated thread flips the phase whenever the current cycle elapses and
//! sends the new phase to the queue. [`PhaseController::wait_for_green`]
//! blocks on that queue until a green transition arrives.
//!
//! The shared queue delivers each transition to one waiter only. Waiters that
//! must each see every transition should call [`PhaseController::subscribe`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::Error;
use crate::phase::Phase;
use crate::policy::{CyclePolicy, RandomCycle};
use crate::queue::{BlockingQueue, RecvError, RecvTimeoutError};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

type PhaseQueue = Arc<BlockingQueue<Phase>>;

/// State shared between the controller and its toggler thread.
struct Shared {
    phase: AtomicU8,
    stop: AtomicBool,
    transitions: AtomicU64,
    queue: PhaseQueue,
    subscribers: Mutex<Vec<PhaseQueue>>,
}

impl Shared {
    fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<PhaseQueue>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, id: usize, phase: Phase) {
        if self.queue.send(phase).is_err() {
            warn!(id, %phase, "transition published after shutdown");
        }
        // Dropped subscriptions close their queue and are pruned here.
        self.subscribers().retain(|queue| queue.send(phase).is_ok());
    }
}

/// A traffic light that toggles its phase on a timer and publishes every change.
///
/// The controller starts [`Phase::Red`]. Dropping it shuts the toggler down.
pub struct PhaseController<P: CyclePolicy = RandomCycle> {
    id: usize,
    poll_interval: Duration,
    shared: Arc<Shared>,
    policy: Mutex<Option<P>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PhaseController<RandomCycle> {
    /// A controller cycling uniformly between 4 and 6 seconds.
    pub fn new() -> Self {
        let config = ControllerConfig::default();
        Self::build(config, config.random_policy())
    }

    /// A controller with random cycles drawn from `config`.
    pub fn with_config(config: ControllerConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self::build(config, config.random_policy()))
    }
}

impl Default for PhaseController<RandomCycle> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: CyclePolicy> PhaseController<P> {
    /// A controller driven by a custom cycle policy.
    ///
    /// Only `poll_interval` is taken from `config`; cycle lengths come from `policy`.
    pub fn with_policy(config: ControllerConfig, policy: P) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self::build(config, policy))
    }

    fn build(config: ControllerConfig, policy: P) -> Self {
        PhaseController {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            poll_interval: config.poll_interval,
            shared: Arc::new(Shared {
                phase: AtomicU8::new(Phase::Red.as_u8()),
                stop: AtomicBool::new(false),
                transitions: AtomicU64::new(0),
                queue: Arc::new(BlockingQueue::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
            policy: Mutex::new(Some(policy)),
            handle: Mutex::new(None),
        }
    }

    /// Replaces the automatically assigned identifier.
    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// The controller's identifier.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Spawns the toggler thread.
    ///
    /// A controller can be started once. Further calls return
    /// [`Error::AlreadyStarted`]; calls after [`shutdown`](Self::shutdown)
    /// return [`Error::Shutdown`].
    pub fn start(&self) -> Result<(), Error> {
        if self.shared.stop.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let policy = self
            .policy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyStarted(self.id))?;
        let shared = self.shared.clone();
        let (id, poll_interval) = (self.id, self.poll_interval);
        *handle = Some(
            thread::Builder::new()
                .name(format!("toggler-{}", id))
                .spawn(move || cycle_through_phases(id, shared, policy, poll_interval))?,
        );
        Ok(())
    }

    /// A snapshot of the current phase. It may change right after it is read.
    pub fn current_phase(&self) -> Phase {
        self.shared.phase()
    }

    /// Number of transitions performed so far.
    pub fn transitions(&self) -> u64 {
        self.shared.transitions.load(Ordering::Acquire)
    }

    /// The queue every transition is published to.
    ///
    /// Receiving from it competes with [`wait_for_green`](Self::wait_for_green).
    pub fn queue(&self) -> Arc<BlockingQueue<Phase>> {
        self.shared.queue.clone()
    }

    /// Blocks until the light turns green after this call begins.
    ///
    /// Transitions still queued from before the call are discarded first, so
    /// an old green left in the shared queue never satisfies the wait. Returns [`Error::Shutdown`] if the controller shuts down first.
    pub fn wait_for_green(&self) -> Result<(), Error> {
        wait_for_green_on(self.id, &self.shared.queue)
    }

    /// Like [`wait_for_green`](Self::wait_for_green), but gives up after `timeout`.
    pub fn wait_for_green_timeout(&self, timeout: Duration) -> Result<(), Error> {
        wait_for_green_timeout_on(self.id, &self.shared.queue, timeout)
    }

    /// A private queue that receives every transition from now on.
    pub fn subscribe(&self) -> PhaseSubscription {
        let queue = Arc::new(BlockingQueue::new());
        let mut subscribers = self.shared.subscribers();
        if self.shared.stop.load(Ordering::Acquire) {
            queue.close();
        } else {
            subscribers.push(queue.clone());
        }
        PhaseSubscription { id: self.id, queue }
    }

    /// Stops and joins the toggler, then releases every blocked waiter.
    ///
    /// Idempotent. Also called on drop.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::Release);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!(id = self.id, "toggler panicked");
            }
        }
        self.shared.queue.close();
        for queue in self.shared.subscribers().drain(..) {
            queue.close();
        }
    }
}

impl<P: CyclePolicy> Drop for PhaseController<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Every transition of one controller, delivered only to this subscriber.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct PhaseSubscription {
    id: usize,
    queue: PhaseQueue,
}

impl PhaseSubscription {
    /// Blocks until the next transition.
    pub fn receive(&self) -> Result<Phase, Error> {
        self.queue.receive().map_err(|RecvError| Error::Shutdown)
    }

    /// The next transition if one is already queued.
    pub fn try_receive(&self) -> Option<Phase> {
        self.queue.try_receive()
    }

    /// Blocks until a green transition arrives on this subscription after this call begins.
    pub fn wait_for_green(&self) -> Result<(), Error> {
        wait_for_green_on(self.id, &self.queue)
    }

    /// Like [`wait_for_green`](Self::wait_for_green), but gives up after `timeout`.
    pub fn wait_for_green_timeout(&self, timeout: Duration) -> Result<(), Error> {
        wait_for_green_timeout_on(self.id, &self.queue, timeout)
    }
}

impl Drop for PhaseSubscription {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// Drops transitions published before the wait began.
fn discard_backlog(id: usize, queue: &BlockingQueue<Phase>) {
    let mut stale = 0usize;
    while queue.try_receive().is_some() {
        stale += 1;
    }
    if stale > 0 {
        debug!(id, stale, "discarded queued transitions");
    }
}

fn wait_for_green_on(id: usize, queue: &BlockingQueue<Phase>) -> Result<(), Error> {
    discard_backlog(id, queue);
    loop {
        match queue.receive() {
            Ok(Phase::Green) => {
                debug!(id, "waiter saw green");
                return Ok(());
            }
            Ok(Phase::Red) => continue,
            Err(RecvError) => return Err(Error::Shutdown),
        }
    }
}

fn wait_for_green_timeout_on(
    id: usize,
    queue: &BlockingQueue<Phase>,
    timeout: Duration,
) -> Result<(), Error> {
    let Some(deadline) = Instant::now().checked_add(timeout) else {
        return wait_for_green_on(id, queue);
    };
    discard_backlog(id, queue);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match queue.receive_timeout(remaining) {
            Ok(Phase::Green) => {
                debug!(id, "waiter saw green");
                return Ok(());
            }
            Ok(Phase::Red) => continue,
            Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout(timeout)),
            Err(RecvTimeoutError::Closed) => return Err(Error::Shutdown),
        }
    }
}

/// The toggler loop. One cycle length is drawn per cycle, then elapsed time
/// is polled against it every `poll_interval` until the stop flag is set.
/// `shutdown` unparks the thread, so a long poll interval never delays it.
fn cycle_through_phases<P: CyclePolicy>(
    id: usize,
    shared: Arc<Shared>,
    mut policy: P,
    poll_interval: Duration,
) {
    info!(id, "toggler started");
    let mut last_update = Instant::now();
    let mut cycle = policy.next_duration();
    debug!(id, cycle_ms = cycle.as_millis() as u64, "cycle drawn");

    while !shared.stop.load(Ordering::Acquire) {
        // Unparked by shutdown.
        thread::park_timeout(poll_interval);
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        if last_update.elapsed() < cycle {
            continue;
        }
        last_update = Instant::now();
        let phase = policy.next_phase(shared.phase());
        shared.phase.store(phase.as_u8(), Ordering::Release);
        shared.transitions.fetch_add(1, Ordering::AcqRel);
        info!(id, %phase, cycle_ms = cycle.as_millis() as u64, "phase changed");
        shared.publish(id, phase);

        cycle = policy.next_duration();
        debug!(id, cycle_ms = cycle.as_millis() as u64, "cycle drawn");
    }
    info!(id, "toggler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FixedCycle;

    fn fast(cycle_ms: u64) -> PhaseController<FixedCycle> {
        PhaseController::with_policy(
            ControllerConfig::default(),
            FixedCycle(Duration::from_millis(cycle_ms)),
        )
        .unwrap()
    }

    #[test]
    fn test_starts_red() {
        let controller = PhaseController::new();
        assert_eq!(controller.current_phase(), Phase::Red);
        assert_eq!(controller.transitions(), 0);
    }

    #[test]
    fn test_ids_are_distinct() {
        let a = PhaseController::new();
        let b = PhaseController::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.with_id(17).id(), 17);
    }

    #[test]
    fn test_start_twice() {
        let controller = fast(50);
        controller.start().unwrap();
        assert!(matches!(
            controller.start(),
            Err(Error::AlreadyStarted(id)) if id == controller.id()
        ));
    }

    #[test]
    fn test_start_after_shutdown() {
        let controller = fast(50);
        controller.shutdown();
        assert!(matches!(controller.start(), Err(Error::Shutdown)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ControllerConfig::with_cycle(Duration::from_secs(2), Duration::from_secs(1));
        assert!(matches!(
            PhaseController::with_config(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_wait_for_green_sees_green() {
        let controller = fast(200);
        controller.start().unwrap();
        controller.wait_for_green().unwrap();
        assert_eq!(controller.current_phase(), Phase::Green);
        assert!(controller.transitions() >= 1);
    }

    #[test]
    fn test_wait_for_green_ignores_queued_transitions() {
        let controller = fast(100);
        controller.start().unwrap();
        thread::sleep(Duration::from_millis(250));
        let before = controller.transitions();
        assert!(before >= 2);
        controller.wait_for_green().unwrap();
        assert!(controller.transitions() > before);
        assert_eq!(controller.current_phase(), Phase::Green);
    }

    #[test]
    fn test_wait_for_green_timeout_ignores_queued_transitions() {
        let controller = fast(100);
        controller.start().unwrap();
        thread::sleep(Duration::from_millis(250));
        let before = controller.transitions();
        controller
            .wait_for_green_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(controller.transitions() > before);
        assert_eq!(controller.current_phase(), Phase::Green);
    }

    #[test]
    fn test_wait_for_green_unbounded_timeout() {
        let controller = fast(30);
        controller.start().unwrap();
        controller.wait_for_green_timeout(Duration::MAX).unwrap();
    }

    #[test]
    fn test_shutdown_wakes_long_poll() {
        let config = ControllerConfig {
            poll_interval: Duration::from_secs(3600),
            ..ControllerConfig::default()
        };
        let controller = PhaseController::with_config(config).unwrap();
        controller.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        controller.shutdown();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_transitions_are_published_in_order() {
        let controller = fast(20);
        let queue = controller.queue();
        controller.start().unwrap();
        let seen: Vec<Phase> = (0..4).map(|_| queue.receive().unwrap()).collect();
        assert_eq!(seen, vec![Phase::Green, Phase::Red, Phase::Green, Phase::Red]);
    }

    #[test]
    fn test_shutdown_releases_waiter() {
        let controller = Arc::new(fast(60_000));
        controller.start().unwrap();
        let waiter = {
            let controller = controller.clone();
            thread::spawn(move || controller.wait_for_green())
        };
        thread::sleep(Duration::from_millis(50));
        controller.shutdown();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Shutdown)));
        controller.shutdown();
    }

    #[test]
    fn test_wait_for_green_timeout() {
        let controller = fast(60_000);
        controller.start().unwrap();
        let err = controller
            .wait_for_green_timeout(Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_subscriptions_each_see_every_transition() {
        let controller = fast(20);
        let a = controller.subscribe();
        let b = controller.subscribe();
        controller.start().unwrap();
        for expected in [Phase::Green, Phase::Red] {
            assert_eq!(a.receive().unwrap(), expected);
            assert_eq!(b.receive().unwrap(), expected);
        }
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let controller = fast(10);
        drop(controller.subscribe());
        let kept = controller.subscribe();
        controller.start().unwrap();
        kept.receive().unwrap();
        kept.receive().unwrap();
        assert_eq!(controller.shared.subscribers().len(), 1);
    }

    #[test]
    fn test_subscribe_after_shutdown_is_closed() {
        let controller = fast(10);
        controller.shutdown();
        let subscription = controller.subscribe();
        assert!(matches!(subscription.receive(), Err(Error::Shutdown)));
    }
}
