//! Scheduler - block-accurate event dispatch
//!
//! The [`Scheduler`] lives on the render thread. Once per block it widens its
//! window by the number of frames rendered and runs every event that has come
//! due, earliest first. Control code talks to it through a
//! [`SchedulerHandle`], which hands events over a bounded `rtrb` ring so the
//! render side never locks. Faults from the render side travel back the same
//! way.

use std::panic::{self, AssertUnwindSafe};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::{
    error::{ActionError, InvalidEvent, SchedulerError},
    event::{capture, Action, CancelToken, Event, Value},
    queue::EventQueue,
    SampleTime,
};

/// Something that went wrong on the render thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fault {
    /// Due time of the failing event, or the sample time of the bad block
    pub at: SampleTime,
    pub kind: FaultKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaultKind {
    /// Action returned an error; the rest of the block still ran
    ActionFailed(ActionError),
    /// Action panicked; the rest of the block still ran
    ActionPanicked,
    /// Clock and scheduler disagree about elapsed samples
    DriverMisuse {
        clock: SampleTime,
        scheduler: SampleTime,
    },
    /// Driver rendered more frames in one call than the configured block size
    OversizedBlock { frames: usize, block_size: usize },
    /// Queue full; this many submitted events wait in the inbox for later blocks
    Backlog { waiting: usize },
}

/// What happened during one `process_block` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockReport {
    /// Right edge of the processed window
    pub window: SampleTime,
    pub fired: u32,
    pub failed: u32,
    pub cancelled: u32,
}

/// Running totals since the scheduler was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub blocks: u64,
    pub fired: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Faults lost because the fault ring was full (or there was none)
    pub dropped_faults: u64,
}

/// Scheduling access handed to a running action.
///
/// Events scheduled here go straight into the live queue; any that fall inside
/// the current window fire later in the same block.
pub struct Cascade<'a, T> {
    queue: &'a mut EventQueue<T>,
    parent: SampleTime,
    window: SampleTime,
}

impl<'a, T> Cascade<'a, T> {
    /// Due time of the event currently running
    pub fn parent_time(&self) -> SampleTime {
        self.parent
    }

    /// Right edge of the block being processed
    pub fn window(&self) -> SampleTime {
        self.window
    }

    /// Schedule a follow-up event strictly after the running one.
    ///
    /// Scheduling at or before the parent's own time is rejected, since it
    /// could keep the block from ever finishing.
    pub fn schedule(
        &mut self,
        due_time: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<(), SchedulerError> {
        if due_time <= self.parent {
            return Err(InvalidEvent::NotAfterParent {
                due_time,
                parent: self.parent,
            }
            .into());
        }
        self.queue.push(Event::new(due_time, action, capture(args)?))
    }

    /// Schedule `delay` samples after the running event
    pub fn schedule_after(
        &mut self,
        delay: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<(), SchedulerError> {
        self.schedule(self.parent.saturating_add(delay), action, args)
    }
}

pub struct Scheduler<T> {
    /// Right edge of the window already processed
    sample_time: SampleTime,
    block_size: usize,
    queue: EventQueue<T>,
    inbox: Option<Consumer<Event<T>>>,
    faults: Option<Producer<Fault>>,
    backlogged: bool,
    stats: SchedulerStats,
}

impl<T> Scheduler<T> {
    /// Standalone scheduler driven and fed from a single thread
    pub fn new(block_size: usize, capacity: usize) -> Self {
        Self {
            sample_time: 0,
            block_size,
            queue: EventQueue::with_capacity(capacity),
            inbox: None,
            faults: None,
            backlogged: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Scheduler plus a producer handle for another thread.
    ///
    /// The inbox ring is sized like the queue, so a handle can never have more
    /// events in flight than the queue can eventually hold.
    pub fn with_handle(
        block_size: usize,
        capacity: usize,
        fault_capacity: usize,
    ) -> (Self, SchedulerHandle<T>) {
        let (event_tx, event_rx) = RingBuffer::new(capacity);
        let (fault_tx, fault_rx) = RingBuffer::new(fault_capacity);

        let mut scheduler = Self::new(block_size, capacity);
        scheduler.inbox = Some(event_rx);
        scheduler.faults = Some(fault_tx);

        let handle = SchedulerHandle {
            outbox: event_tx,
            faults: fault_rx,
            capacity,
        };
        (scheduler, handle)
    }

    /// Enqueue an event from the thread that owns the scheduler.
    ///
    /// There is no lower bound on `due_time`: an event in the past fires on the
    /// next block.
    pub fn schedule(
        &mut self,
        due_time: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<(), SchedulerError> {
        self.queue.push(Event::new(due_time, action, capture(args)?))
    }

    /// Like [`schedule`](Self::schedule), returning a token that withdraws the event
    pub fn schedule_cancellable(
        &mut self,
        due_time: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<CancelToken, SchedulerError> {
        let token = CancelToken::new();
        let event = Event::new(due_time, action, capture(args)?).with_cancel(token.clone());
        self.queue.push(event)?;
        Ok(token)
    }

    /// Process one full block of `block_size` frames
    pub fn process_block(&mut self, target: &mut T) -> BlockReport {
        self.process_frames(self.block_size, target)
    }

    /// Process a block of `frames` frames (partial blocks at stream edges).
    ///
    /// Every event with `due_time <= sample_time + frames` runs, earliest
    /// first, then the window edge moves forward. Failing actions are reported
    /// and skipped; they never stop the rest of the block.
    pub fn process_frames(&mut self, frames: usize, target: &mut T) -> BlockReport {
        self.pull_inbox();

        let window = self.sample_time.saturating_add(frames as SampleTime);
        let mut report = BlockReport {
            window,
            ..BlockReport::default()
        };

        while let Some(event) = self.queue.pop_due(window) {
            if event.is_cancelled() {
                report.cancelled += 1;
                continue;
            }

            let at = event.due_time;
            let mut cascade = Cascade {
                queue: &mut self.queue,
                parent: at,
                window,
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (event.action)(&mut *target, &event.args, &mut cascade)
            }));

            let kind = match outcome {
                Ok(Ok(())) => {
                    report.fired += 1;
                    continue;
                }
                Ok(Err(err)) => FaultKind::ActionFailed(err),
                Err(_) => FaultKind::ActionPanicked,
            };
            report.failed += 1;
            self.report_fault(Fault { at, kind });
        }

        self.sample_time = window;
        self.stats.blocks += 1;
        self.stats.fired += report.fired as u64;
        self.stats.failed += report.failed as u64;
        self.stats.cancelled += report.cancelled as u64;
        report
    }

    /// Move submitted events from the ring into the queue, as far as it has room
    fn pull_inbox(&mut self) {
        let Some(inbox) = self.inbox.as_mut() else {
            return;
        };

        while !self.queue.is_full() {
            let Ok(event) = inbox.pop() else {
                break;
            };
            // room checked above
            let _ = self.queue.push(event);
        }

        // report once when a backlog starts, not on every block it lasts
        let waiting = inbox.slots();
        if waiting == 0 {
            self.backlogged = false;
        } else if !self.backlogged {
            self.backlogged = true;
            self.report_fault(Fault {
                at: self.sample_time,
                kind: FaultKind::Backlog { waiting },
            });
        }
    }

    pub(crate) fn report_fault(&mut self, fault: Fault) {
        let sent = match self.faults.as_mut() {
            Some(tx) => tx.push(fault).is_ok(),
            None => false,
        };
        if !sent {
            self.stats.dropped_faults += 1;
        }
    }

    pub fn sample_time(&self) -> SampleTime {
        self.sample_time
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Events waiting in the queue (not counting the inbox)
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

/// Control-side half of a scheduler; `Send`, so it can live on the UI thread
pub struct SchedulerHandle<T> {
    outbox: Producer<Event<T>>,
    faults: Consumer<Fault>,
    capacity: usize,
}

impl<T> SchedulerHandle<T> {
    /// Submit an event to the render thread.
    ///
    /// Arguments are validated here, before anything crosses threads.
    pub fn schedule(
        &mut self,
        due_time: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<(), SchedulerError> {
        self.submit(Event::new(due_time, action, capture(args)?))
    }

    pub fn schedule_cancellable(
        &mut self,
        due_time: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<CancelToken, SchedulerError> {
        let token = CancelToken::new();
        self.submit(Event::new(due_time, action, capture(args)?).with_cancel(token.clone()))?;
        Ok(token)
    }

    fn submit(&mut self, event: Event<T>) -> Result<(), SchedulerError> {
        self.outbox.push(event).map_err(|_| SchedulerError::QueueFull {
            capacity: self.capacity,
        })
    }

    /// Free slots in the submission ring
    pub fn available(&self) -> usize {
        self.outbox.slots()
    }

    /// Collect faults reported by the render thread, logging each one
    pub fn drain_faults(&mut self) -> Vec<Fault> {
        let mut out = Vec::with_capacity(self.faults.slots());
        while let Ok(fault) = self.faults.pop() {
            tracing::warn!(at = fault.at, kind = ?fault.kind, "render thread fault");
            out.push(fault);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records (due_time, tag) for every fired event
    type Log = Vec<(SampleTime, i64)>;

    fn record(log: &mut Log, args: &[Value], cx: &mut Cascade<'_, Log>) -> Result<(), ActionError> {
        log.push((cx.parent_time(), args[0].as_int().unwrap_or(-1)));
        Ok(())
    }

    fn fail(_: &mut Log, _: &[Value], _: &mut Cascade<'_, Log>) -> Result<(), ActionError> {
        Err(ActionError::Failed("bad note"))
    }

    fn explode(_: &mut Log, _: &[Value], _: &mut Cascade<'_, Log>) -> Result<(), ActionError> {
        panic!("synth exploded");
    }

    // fires at 15, then schedules a tagged follow-up at 18
    fn chain(log: &mut Log, args: &[Value], cx: &mut Cascade<'_, Log>) -> Result<(), ActionError> {
        record(log, args, cx)?;
        cx.schedule(18, record, &[Value::Int(99)])?;
        Ok(())
    }

    fn loop_forever(_: &mut Log, _: &[Value], cx: &mut Cascade<'_, Log>) -> Result<(), ActionError> {
        let at = cx.parent_time();
        cx.schedule(at, loop_forever, &[])?;
        Ok(())
    }

    #[test]
    fn test_single_block_fires_in_time_order() {
        let mut sched: Scheduler<Log> = Scheduler::new(20, 16);
        let mut log = Log::new();
        sched.schedule(0, record, &[Value::Int(0)]).unwrap();
        sched.schedule(10, record, &[Value::Int(10)]).unwrap();
        sched.schedule(5, record, &[Value::Int(5)]).unwrap();

        let report = sched.process_block(&mut log);

        assert_eq!(log, vec![(0, 0), (5, 5), (10, 10)]);
        assert_eq!(report.fired, 3);
        assert_eq!(report.window, 20);
        assert_eq!(sched.sample_time(), 20);
    }

    #[test]
    fn test_event_on_window_edge_fires_in_that_block() {
        let mut sched: Scheduler<Log> = Scheduler::new(20, 16);
        let mut log = Log::new();
        sched.schedule(20, record, &[Value::Int(1)]).unwrap();
        sched.schedule(21, record, &[Value::Int(2)]).unwrap();

        sched.process_block(&mut log);
        assert_eq!(log, vec![(20, 1)]);

        sched.process_block(&mut log);
        assert_eq!(log, vec![(20, 1), (21, 2)]);
    }

    #[test]
    fn test_past_event_fires_on_next_block() {
        let mut sched: Scheduler<Log> = Scheduler::new(64, 16);
        let mut log = Log::new();
        for _ in 0..4 {
            sched.process_block(&mut log);
        }
        sched.schedule(3, record, &[Value::Int(3)]).unwrap();
        sched.process_block(&mut log);
        assert_eq!(log, vec![(3, 3)]);
    }

    #[test]
    fn test_cascade_fires_within_same_block() {
        let mut sched: Scheduler<Log> = Scheduler::new(20, 16);
        let mut log = Log::new();
        sched.schedule(15, chain, &[Value::Int(15)]).unwrap();

        let report = sched.process_block(&mut log);
        assert_eq!(log, vec![(15, 15), (18, 99)]);
        assert_eq!(report.fired, 2);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_cascade_outside_window_waits() {
        let mut sched: Scheduler<Log> = Scheduler::new(16, 16);
        let mut log = Log::new();
        sched.schedule(15, chain, &[Value::Int(15)]).unwrap();

        sched.process_block(&mut log);
        assert_eq!(log, vec![(15, 15)]);
        assert_eq!(sched.pending(), 1);

        sched.process_block(&mut log);
        assert_eq!(log, vec![(15, 15), (18, 99)]);
    }

    #[test]
    fn test_self_scheduling_at_same_time_is_rejected() {
        let (mut sched, mut handle) = Scheduler::<Log>::with_handle(32, 16, 8);
        let mut log = Log::new();
        sched.schedule(4, loop_forever, &[]).unwrap();

        let report = sched.process_block(&mut log);
        assert_eq!(report.failed, 1);
        assert_eq!(sched.pending(), 0);

        let faults = handle.drain_faults();
        assert_eq!(
            faults,
            vec![Fault {
                at: 4,
                kind: FaultKind::ActionFailed(ActionError::Schedule(
                    SchedulerError::InvalidEvent(InvalidEvent::NotAfterParent {
                        due_time: 4,
                        parent: 4
                    })
                )),
            }]
        );
    }

    #[test]
    fn test_failures_do_not_silence_the_block() {
        let (mut sched, mut handle) = Scheduler::<Log>::with_handle(32, 16, 8);
        let mut log = Log::new();
        sched.schedule(1, record, &[Value::Int(1)]).unwrap();
        sched.schedule(2, fail, &[]).unwrap();
        sched.schedule(3, explode, &[]).unwrap();
        sched.schedule(4, record, &[Value::Int(4)]).unwrap();

        let report = sched.process_block(&mut log);

        assert_eq!(log, vec![(1, 1), (4, 4)]);
        assert_eq!(report.fired, 2);
        assert_eq!(report.failed, 2);

        let kinds: Vec<_> = handle.drain_faults().into_iter().map(|f| (f.at, f.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (2, FaultKind::ActionFailed(ActionError::Failed("bad note"))),
                (3, FaultKind::ActionPanicked),
            ]
        );
    }

    #[test]
    fn test_cancelled_events_are_skipped() {
        let mut sched: Scheduler<Log> = Scheduler::new(32, 16);
        let mut log = Log::new();
        let keep = sched.schedule_cancellable(5, record, &[Value::Int(5)]).unwrap();
        let withdrawn = sched.schedule_cancellable(6, record, &[Value::Int(6)]).unwrap();
        withdrawn.cancel();

        let report = sched.process_block(&mut log);
        assert_eq!(log, vec![(5, 5)]);
        assert_eq!(report.cancelled, 1);
        assert!(!keep.is_cancelled());
    }

    #[test]
    fn test_handle_events_arrive_before_draining() {
        let (mut sched, mut handle) = Scheduler::<Log>::with_handle(20, 16, 8);
        let mut log = Log::new();
        handle.schedule(10, record, &[Value::Int(10)]).unwrap();
        handle.schedule(0, record, &[Value::Int(0)]).unwrap();
        handle.schedule(40, record, &[Value::Int(40)]).unwrap();

        sched.process_block(&mut log);
        assert_eq!(log, vec![(0, 0), (10, 10)]);
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn test_full_inbox_pushes_back_on_producer() {
        let (mut sched, mut handle) = Scheduler::<Log>::with_handle(20, 2, 8);
        let mut log = Log::new();
        handle.schedule(1, record, &[Value::Int(1)]).unwrap();
        handle.schedule(2, record, &[Value::Int(2)]).unwrap();
        assert_eq!(
            handle.schedule(3, record, &[Value::Int(3)]),
            Err(SchedulerError::QueueFull { capacity: 2 })
        );
        assert_eq!(handle.available(), 0);

        sched.process_block(&mut log);
        assert_eq!(handle.available(), 2);
        handle.schedule(3, record, &[Value::Int(3)]).unwrap();
        sched.process_block(&mut log);
        assert_eq!(log, vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_backlog_waits_in_inbox_until_queue_has_room() {
        let (mut sched, mut handle) = Scheduler::<Log>::with_handle(10, 2, 8);
        let mut log = Log::new();
        // fill the queue directly with far-future events
        sched.schedule(1_000, record, &[Value::Int(-1)]).unwrap();
        sched.schedule(1_001, record, &[Value::Int(-2)]).unwrap();
        handle.schedule(5, record, &[Value::Int(5)]).unwrap();

        sched.process_block(&mut log);
        assert!(log.is_empty());
        assert_eq!(
            handle.drain_faults(),
            vec![Fault {
                at: 0,
                kind: FaultKind::Backlog { waiting: 1 }
            }]
        );

        // run past the far-future events; the late one still fires
        while sched.sample_time() < 1_010 {
            sched.process_block(&mut log);
        }
        // the late event is pulled in once there is room and sorts ahead of 1001
        assert_eq!(log, vec![(1_000, -1), (5, 5), (1_001, -2)]);
        assert!(handle.drain_faults().is_empty());
    }

    #[test]
    fn test_too_many_args_rejected_up_front() {
        let mut sched: Scheduler<Log> = Scheduler::new(20, 4);
        let args = [Value::Int(0); crate::MAX_ARGS + 1];
        assert_eq!(
            sched.schedule(0, record, &args),
            Err(SchedulerError::InvalidEvent(InvalidEvent::TooManyArgs {
                max: crate::MAX_ARGS
            }))
        );
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_partial_block_moves_window_by_frames() {
        let mut sched: Scheduler<Log> = Scheduler::new(256, 4);
        let mut log = Log::new();
        sched.schedule(100, record, &[Value::Int(1)]).unwrap();
        let report = sched.process_frames(64, &mut log);
        assert_eq!(report.window, 64);
        assert!(log.is_empty());
        sched.process_frames(36, &mut log);
        assert_eq!(log, vec![(100, 1)]);
        assert_eq!(sched.stats().blocks, 2);
    }

    #[test]
    fn test_faults_without_ring_are_counted() {
        let mut sched: Scheduler<Log> = Scheduler::new(8, 4);
        let mut log = Log::new();
        sched.schedule(0, fail, &[]).unwrap();
        sched.process_block(&mut log);
        assert_eq!(sched.stats().failed, 1);
        assert_eq!(sched.stats().dropped_faults, 1);
    }
}
