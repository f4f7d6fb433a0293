//! # Runtime
//!
//! Public entry point. Owns the host adapter, the scheduler and the
//! reconciler, and drains the inbox that setters, stores and resume tokens
//! post to.
//!
//! ```text
//!   tick():  drain inbox ─► preempt? ─► continue or start a pass
//!                                            │
//!                         yield ◄── slice ───┤
//!                                            ▼
//!                               tearing check ─► commit ─► drain inbox
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use canopy_core::{
    Element, HookAddr, HostAdapter, HostHandle, Inbox, InboxReceiver, Lane, Payload, ResumeTarget,
    RootId, Signal,
};

use crate::bridge::{first_torn, stale_subscribers};
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::reconciler::{
    CommitReport, Enqueued, PassFault, Reconciler, RootHandle, RootStatus, WorkInProgress,
};
use crate::scheduler::{Clock, Scheduler, Selection, SliceBudget, SystemClock};

/// Counters since the runtime was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Render passes started (restarts included).
    pub passes_started: u64,
    /// Units of work performed.
    pub units: u64,
    /// Passes committed.
    pub commits: u64,
    /// Slices that ended before their pass completed.
    pub yields: u64,
    /// Work-in-progress trees discarded for more urgent work.
    pub preemptions: u64,
    /// Passes discarded because a store changed during render.
    pub tearing_restarts: u64,
    /// Lanes that starved and were escalated.
    pub expirations: u64,
    /// Passes abandoned by a suspension without a boundary.
    pub suspensions: u64,
    /// Updates addressed to unmounted instances.
    pub updates_dropped: u64,
    /// Updates that would not have changed the state.
    pub updates_skipped: u64,
    /// Faults handled by boundaries.
    pub caught_faults: u64,
}

/// Result of one [`Runtime::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to render.
    Idle,
    /// The slice ran out; the pass continues on the next tick.
    Yielded,
    /// A pass committed.
    Committed(CommitReport),
    /// A pass suspended without a boundary; the root waits for its token.
    Suspended(RootId),
}

/// A concurrent rendering runtime over a host adapter.
pub struct Runtime<H: HostAdapter> {
    host: H,
    config: RuntimeConfig,
    scheduler: Scheduler,
    reconciler: Reconciler,
    receiver: InboxReceiver,
    inbox: Inbox,
    wip: Option<WorkInProgress>,
    /// An update landed inside the lanes of the pass in progress.
    restart: bool,
    stats: RuntimeStats,
    last_commit: Option<CommitReport>,
}

impl<H: HostAdapter> Runtime<H> {
    /// Creates a runtime driven by the system clock.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Config`] for out-of-range settings.
    pub fn new(host: H, config: RuntimeConfig) -> RuntimeResult<Self> {
        Self::with_clock(host, config, Arc::new(SystemClock::new()))
    }

    /// Creates a runtime with an explicit time source.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Config`] for out-of-range settings.
    pub fn with_clock(host: H, config: RuntimeConfig, clock: Arc<dyn Clock>) -> RuntimeResult<Self> {
        config.validate()?;
        let (inbox, receiver) = Inbox::channel();
        Ok(Self {
            host,
            scheduler: Scheduler::new(config.scheduler.clone(), clock),
            reconciler: Reconciler::new(inbox.clone()),
            config,
            receiver,
            inbox,
            wip: None,
            restart: false,
            stats: RuntimeStats::default(),
            last_commit: None,
        })
    }

    /// Mounts `element` into `container` and renders it synchronously.
    ///
    /// A pass in progress on another root is interrupted.
    ///
    /// # Errors
    ///
    /// Uncaught render errors, host failures and store tearing that does not
    /// settle. The root is crashed in each case.
    pub fn mount(&mut self, element: Element, container: HostHandle) -> RuntimeResult<RootHandle> {
        self.drain_inbox(None);
        let root = self.reconciler.create_root(container);
        self.reconciler
            .set_root_element(root, Lane::Immediate, Arc::from(vec![element]));
        self.scheduler.enqueue(root);
        tracing::debug!(%root, container = container.raw(), "mounting root");

        self.interrupt();
        let selection = self.scheduler.selection(root, Lane::Immediate, false);
        self.run_sync(selection)?;
        Ok(RootHandle { root, container })
    }

    /// Renders a new element into a mounted root at the default lane.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] or [`RuntimeError::RootCrashed`].
    pub fn render(&mut self, root: RootId, element: Element) -> RuntimeResult<()> {
        self.ensure_active(root)?;
        let lane = self.config.default_lane;
        self.reconciler.set_root_element(root, lane, Arc::from(vec![element]));
        self.scheduled(root, lane);
        Ok(())
    }

    /// Queues a state update directly. Updates already posted through
    /// setters are queued first.
    ///
    /// Returns true if the update was queued; updates for unmounted
    /// instances and updates that keep the same state are dropped.
    pub fn schedule_update(&mut self, addr: HookAddr, payload: Payload, lane: Option<Lane>) -> bool {
        self.drain_inbox(None);
        let lane = lane.unwrap_or(self.config.default_lane);
        self.enqueue(addr, payload, lane)
    }

    /// Runs `f` and coalesces every update it posts into `lane` (unless the
    /// update names its own lane). Sync lanes are flushed before returning.
    ///
    /// # Errors
    ///
    /// Whatever [`Runtime::flush_sync`] returns.
    pub fn batched<R>(&mut self, lane: Lane, f: impl FnOnce() -> R) -> RuntimeResult<R> {
        let result = f();
        self.drain_inbox(Some(lane));
        if self.scheduler.config().sync_lane_set().contains(lane) {
            self.flush_sync()?;
        }
        Ok(result)
    }

    /// Unmounts a root, running every cleanup.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] or [`RuntimeError::RootCrashed`].
    pub fn unmount(&mut self, root: RootId) -> RuntimeResult<()> {
        self.ensure_active(root)?;
        if self.wip.as_ref().is_some_and(|wip| wip.selection.root == root) {
            if let Some(mut wip) = self.wip.take() {
                self.reconciler.discard(&mut wip);
            }
        }
        self.reconciler
            .teardown_root(root, Some(&mut self.host as &mut dyn HostAdapter));
        if let Some(container) = self.reconciler.root_mut(root) {
            container.status = RootStatus::Unmounted;
        }
        self.scheduler.remove(root);
        tracing::debug!(%root, "root unmounted");
        Ok(())
    }

    /// Performs one scheduling step: drains the inbox, handles preemption,
    /// then works on the most urgent pass. Concurrent passes yield when the
    /// slice runs out; sync passes run to completion.
    ///
    /// # Errors
    ///
    /// Uncaught render errors, commit failures and exhausted tearing retries.
    pub fn tick(&mut self) -> RuntimeResult<TickOutcome> {
        self.drain_inbox(None);
        self.check_preemption();

        if self.wip.is_none() {
            let Some(selection) = self.select() else {
                return Ok(TickOutcome::Idle);
            };
            if !self.start(selection) {
                return Ok(TickOutcome::Idle);
            }
        }

        let sync = self.wip.as_ref().is_some_and(|wip| wip.selection.sync);
        let budget = (!sync).then(|| self.scheduler.begin_slice());
        self.work(budget)
    }

    /// Renders and commits every sync or expired lane now. Returns the
    /// number of commits.
    ///
    /// # Errors
    ///
    /// Pass failures, or [`RuntimeError::UpdateLimitExceeded`] when one
    /// root's commits keep scheduling more sync work.
    pub fn flush_sync(&mut self) -> RuntimeResult<usize> {
        let mut cascade = Cascade::new(self.config.nested_update_limit);
        loop {
            self.drain_inbox(None);
            let Some(selection) = self.select().filter(|selection| selection.sync) else {
                return Ok(cascade.commits);
            };
            cascade.check(selection.root)?;
            self.interrupt();
            if let TickOutcome::Committed(report) = self.run_sync(selection)? {
                cascade.settled(report.root, true)?;
            }
        }
    }

    /// Ticks until nothing is left to render. Returns the number of commits.
    ///
    /// # Errors
    ///
    /// Pass failures, or [`RuntimeError::UpdateLimitExceeded`] when one
    /// root keeps scheduling more work for itself.
    pub fn run_until_idle(&mut self) -> RuntimeResult<usize> {
        let mut cascade = Cascade::new(self.config.nested_update_limit);
        loop {
            match self.tick()? {
                TickOutcome::Idle => return Ok(cascade.commits),
                TickOutcome::Yielded => {}
                TickOutcome::Committed(report) => cascade.settled(report.root, true)?,
                TickOutcome::Suspended(root) => cascade.settled(root, false)?,
            }
        }
    }

    /// Host adapter.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Host adapter, mutably (for test hooks on the adapter).
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Lifecycle of a root, if it was ever mounted.
    #[must_use]
    pub fn root_status(&self, root: RootId) -> Option<RootStatus> {
        self.reconciler.root(root).map(|container| container.status)
    }

    /// Returns true if any root has renderable work or signals are queued.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.wip.is_some() || self.receiver.has_signals() || self.select().is_some()
    }

    /// Inbox handles post to. Clone it to hand to other threads.
    #[must_use]
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Report of the most recent commit.
    #[must_use]
    pub fn last_commit(&self) -> Option<&CommitReport> {
        self.last_commit.as_ref()
    }

    /// Preemptions of `lane` on `root` since that lane last committed.
    #[must_use]
    pub fn preemptions(&self, root: RootId, lane: Lane) -> u32 {
        self.scheduler.preemptions(root, lane)
    }

    /// Live fibers across all roots and both buffers.
    #[must_use]
    pub fn fiber_count(&self) -> usize {
        self.reconciler.fiber_count()
    }

    /// Mounted instances across all roots.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.reconciler.instance_count()
    }

    fn ensure_active(&self, root: RootId) -> RuntimeResult<()> {
        match self.reconciler.root(root).map(|container| container.status) {
            Some(RootStatus::Active) => Ok(()),
            Some(RootStatus::Crashed) => Err(RuntimeError::RootCrashed(root)),
            Some(RootStatus::Unmounted) | None => Err(RuntimeError::UnknownRoot(root)),
        }
    }

    fn select(&self) -> Option<Selection> {
        let reconciler = &self.reconciler;
        self.scheduler.select(|root| reconciler.root_lanes(root))
    }

    fn prune(&mut self) {
        let reconciler = &self.reconciler;
        self.scheduler.prune(|root| reconciler.root_lanes(root));
    }

    fn start(&mut self, selection: Selection) -> bool {
        self.restart = false;
        match self.reconciler.prepare(selection) {
            Some(wip) => {
                tracing::debug!(
                    root = %selection.root,
                    lane = %selection.lane,
                    sync = selection.sync,
                    "render pass started"
                );
                self.stats.passes_started += 1;
                self.wip = Some(wip);
                true
            }
            None => {
                self.prune();
                false
            }
        }
    }

    fn run_sync(&mut self, selection: Selection) -> RuntimeResult<TickOutcome> {
        if !self.start(Selection { sync: true, ..selection }) {
            return Ok(TickOutcome::Idle);
        }
        self.work(None)
    }

    fn work(&mut self, mut budget: Option<SliceBudget>) -> RuntimeResult<TickOutcome> {
        loop {
            let Some(wip) = self.wip.as_mut() else {
                return Ok(TickOutcome::Idle);
            };
            self.stats.units += 1;
            match self.reconciler.perform_unit(wip) {
                Ok(true) => return self.finish(),
                Ok(false) => {}
                Err(fault) => return self.fail(fault),
            }
            if let Some(budget) = budget.as_mut() {
                budget.spend_unit();
                if self.scheduler.should_yield(budget) {
                    self.stats.yields += 1;
                    tracing::trace!(units = budget.units(), "slice used up; yielding");
                    return Ok(TickOutcome::Yielded);
                }
            }
        }
    }

    /// Commits a completed pass, unless a store it read has changed.
    fn finish(&mut self) -> RuntimeResult<TickOutcome> {
        let Some(mut wip) = self.wip.take() else {
            return Ok(TickOutcome::Idle);
        };
        let selection = wip.selection;
        let root = selection.root;

        let stale = stale_subscribers(&self.reconciler.arena, wip.root_fiber, &wip.store_reads);
        if first_torn(&wip.store_reads).is_some() || !stale.is_empty() {
            self.reconciler.discard(&mut wip);
            self.stats.tearing_restarts += 1;
            let attempts = self.reconciler.root_mut(root).map_or(0, |container| {
                container.tearing_retries += 1;
                container.tearing_retries
            });
            if attempts >= self.config.store_retry_budget {
                tracing::warn!(%root, attempts, "store snapshots never settled; crashing root");
                self.crash(root, true);
                return Err(RuntimeError::StoreTearingRetryExhausted { root, attempts });
            }
            tracing::debug!(
                %root,
                attempts,
                stale = stale.len(),
                "store changed during render; restarting synchronously"
            );
            // Subscribers that bailed out must render again in the restart.
            self.drain_inbox(None);
            for instance in stale {
                self.reconciler.force_update(instance, Lane::Immediate);
            }
            return self.run_sync(selection);
        }

        let report = match self.reconciler.commit(&mut wip, &mut self.host) {
            Ok(report) => report,
            Err(source) => {
                self.reconciler.discard(&mut wip);
                tracing::warn!(%root, error = %source, "commit failed; crashing root");
                self.crash(root, false);
                return Err(RuntimeError::Commit { root, source });
            }
        };

        self.stats.commits += 1;
        self.stats.caught_faults += report.caught.len() as u64;
        self.scheduler.committed(root, selection.lanes);
        self.scheduler.requeue(root);
        self.prune();
        self.last_commit = Some(report.clone());
        self.drain_inbox(None);
        Ok(TickOutcome::Committed(report))
    }

    fn fail(&mut self, fault: PassFault) -> RuntimeResult<TickOutcome> {
        let Some(mut wip) = self.wip.take() else {
            return Ok(TickOutcome::Idle);
        };
        self.reconciler.discard(&mut wip);
        let root = wip.selection.root;

        match fault {
            PassFault::Uncaught(source) => {
                tracing::warn!(%root, error = %source, "render error reached the root; crashing it");
                self.crash(root, true);
                Err(RuntimeError::UncaughtRender { root, source })
            }
            PassFault::Suspended(token) => {
                if let Some(container) = self.reconciler.root_mut(root) {
                    let suspended = container.lanes.pending.intersection(wip.lanes());
                    container.lanes.suspended |= suspended;
                }
                token.watch(&self.inbox, ResumeTarget::Root(root));
                self.stats.suspensions += 1;
                tracing::debug!(%root, "pass suspended without a boundary");
                Ok(TickOutcome::Suspended(root))
            }
        }
    }

    /// Tears a root down after a failure. The host is only touched when the
    /// failure did not come from the host.
    fn crash(&mut self, root: RootId, detach: bool) {
        let host = detach.then_some(&mut self.host as &mut dyn HostAdapter);
        self.reconciler.teardown_root(root, host);
        if let Some(container) = self.reconciler.root_mut(root) {
            container.status = RootStatus::Crashed;
        }
        self.scheduler.remove(root);
    }

    /// Discards the pass in progress, counting it against its lane.
    fn interrupt(&mut self) {
        let Some(mut wip) = self.wip.take() else {
            return;
        };
        self.reconciler.discard(&mut wip);
        self.stats.preemptions += 1;
        let Selection { root, lane, .. } = wip.selection;
        if self.scheduler.record_preemption(root, lane) {
            self.stats.expirations += 1;
            if let Some(container) = self.reconciler.root_mut(root) {
                container.lanes.expired.insert(lane);
            }
        }
        tracing::debug!(%root, %lane, "pass preempted");
    }

    fn check_preemption(&mut self) {
        let Some(current) = self.wip.as_ref().map(|wip| wip.selection) else {
            return;
        };
        let restart = std::mem::take(&mut self.restart);
        let outranked = self.select().is_some_and(|next| next.preempts(&current));
        if restart || outranked {
            self.interrupt();
        }
    }

    fn enqueue(&mut self, addr: HookAddr, payload: Payload, lane: Lane) -> bool {
        let rendering = self.wip.as_ref().map(|wip| wip.selection.root);
        match self.reconciler.enqueue_update(addr, payload, lane, rendering) {
            Enqueued::Dropped => {
                self.stats.updates_dropped += 1;
                false
            }
            Enqueued::Skipped => {
                self.stats.updates_skipped += 1;
                false
            }
            Enqueued::Scheduled(root) => {
                self.scheduled(root, lane);
                true
            }
        }
    }

    fn scheduled(&mut self, root: RootId, lane: Lane) {
        self.scheduler.enqueue(root);
        if self
            .wip
            .as_ref()
            .is_some_and(|wip| wip.selection.root == root && wip.lanes().contains(lane))
        {
            self.restart = true;
        }
    }

    /// Event boundary: moves every posted signal into the update queues.
    /// Updates without an explicit lane take `batch_lane`, or the default.
    fn drain_inbox(&mut self, batch_lane: Option<Lane>) {
        for signal in self.receiver.drain() {
            match signal {
                Signal::Update { addr, payload, lane } => {
                    let lane = lane.or(batch_lane).unwrap_or(self.config.default_lane);
                    self.enqueue(addr, payload, lane);
                }
                Signal::StoreChanged { instance } => {
                    if let Some(root) = self.reconciler.force_update(instance, Lane::Immediate) {
                        self.scheduled(root, Lane::Immediate);
                    }
                }
                Signal::Resumed {
                    target: ResumeTarget::Root(root),
                    ..
                } => {
                    if self.reconciler.resume_root(root) {
                        self.scheduler.enqueue(root);
                    }
                }
                Signal::Resumed {
                    target: ResumeTarget::Boundary(instance),
                    ..
                } => {
                    if let Some(root) = self.reconciler.force_update(instance, Lane::Retry) {
                        self.scheduled(root, Lane::Retry);
                    }
                }
            }
        }
    }
}

/// Passes settled per root within one `flush_sync` or `run_until_idle`
/// call. Independent roots never count against each other.
#[derive(Debug)]
struct Cascade {
    limit: u32,
    commits: usize,
    per_root: HashMap<RootId, u32>,
}

impl Cascade {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            commits: 0,
            per_root: HashMap::new(),
        }
    }

    /// Records a commit or suspension of `root`.
    fn settled(&mut self, root: RootId, committed: bool) -> RuntimeResult<()> {
        if committed {
            self.commits += 1;
        }
        let settled = self.per_root.entry(root).or_insert(0);
        *settled += 1;
        if *settled > self.limit {
            return Err(self.error(root));
        }
        Ok(())
    }

    /// Fails before `root` settles once more than the limit allows.
    fn check(&self, root: RootId) -> RuntimeResult<()> {
        if self.per_root.get(&root).copied().unwrap_or(0) >= self.limit {
            return Err(self.error(root));
        }
        Ok(())
    }

    fn error(&self, root: RootId) -> RuntimeError {
        tracing::warn!(%root, limit = self.limit, "updates keep scheduling more work");
        RuntimeError::UpdateLimitExceeded {
            root,
            limit: self.limit,
        }
    }
}

impl<H: HostAdapter> std::fmt::Debug for Runtime<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("in_progress", &self.wip.as_ref().map(|wip| wip.selection))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
