use std::sync::Arc;
use std::time::{Duration, Instant};

use loadr_metrics::Registry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::builtin_metrics::{BuiltinMetrics, HTTP_REQ_DURATION};
use crate::config::{RunOptions, ThinkTime};
use crate::progress::{LiveCounters, ProgressFn, ProgressUpdate};
use crate::scenario::VuShared;
use crate::schedule::VuSchedule;
use crate::signal::StopSignal;
use crate::thresholds_eval::{CompiledThreshold, ThresholdOutcome, evaluate_one};
use crate::vu::{VuContext, run_vu};

struct LiveVu {
    id: u64,
    stop: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

struct DrainingVu {
    vu: LiveVu,
    deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    ScheduleDone,
    IterationsDone,
    Aborted,
    Interrupted,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SchedulerOutcome {
    pub(crate) elapsed: Duration,
    pub(crate) aborted_by: Option<ThresholdOutcome>,
    pub(crate) interrupted: bool,
    /// VUs aborted because they outlived a grace period.
    pub(crate) forced_stops: u64,
}

/// Control task that keeps the live VU pool on the schedule's target.
pub(crate) struct StageScheduler {
    pub(crate) schedule: VuSchedule,
    pub(crate) iterations: Option<u64>,
    pub(crate) think_time: ThinkTime,
    pub(crate) options: RunOptions,
    pub(crate) shared: Arc<VuShared>,
    pub(crate) abort_thresholds: Vec<CompiledThreshold>,
    pub(crate) progress: Option<ProgressFn>,
    /// Stops the run early from outside, e.g. on Ctrl-C.
    pub(crate) interrupt: Arc<StopSignal>,
}

struct Pool {
    active: Vec<LiveVu>,
    draining: Vec<DrainingVu>,
    /// VUs that ended their loop on their own (iteration budget spent).
    finished: Vec<u64>,
    /// Force-stopped tasks, awaited before the run returns.
    aborted: Vec<JoinHandle<()>>,
    next_id: u64,
    forced_stops: u64,
}

impl Pool {
    fn new() -> Self {
        Self {
            active: Vec::new(),
            draining: Vec::new(),
            finished: Vec::new(),
            aborted: Vec::new(),
            next_id: 1,
            forced_stops: 0,
        }
    }

    fn mark_exited(&mut self, id: u64) {
        if self.active.iter().any(|v| v.id == id) {
            self.finished.push(id);
        }
        self.draining.retain(|d| d.vu.id != id);
    }

    fn all_active_finished(&self) -> bool {
        self.active.iter().all(|v| self.finished.contains(&v.id))
    }

    fn retire_last(&mut self, grace: Duration) {
        if let Some(vu) = self.active.pop() {
            vu.stop.stop();
            tracing::debug!(vu = vu.id, "retiring vu");
            self.draining.push(DrainingVu {
                vu,
                deadline: Instant::now() + grace,
            });
        }
    }

    fn retire_all(&mut self, grace: Duration) {
        while !self.active.is_empty() {
            self.retire_last(grace);
        }
    }

    fn reap_draining(&mut self, now: Instant) {
        let (expired, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.draining)
            .into_iter()
            .filter(|d| !d.vu.handle.is_finished())
            .partition(|d| now >= d.deadline);
        self.draining = keep;

        for d in expired {
            tracing::warn!(vu = d.vu.id, "vu exceeded its grace period, aborting");
            self.force_stop(d.vu);
        }
    }

    fn force_stop(&mut self, vu: LiveVu) {
        vu.handle.abort();
        self.aborted.push(vu.handle);
        self.forced_stops += 1;
    }
}

impl StageScheduler {
    pub(crate) async fn run(
        self,
        registry: Arc<Registry>,
        metrics: BuiltinMetrics,
        counters: Arc<LiveCounters>,
    ) -> SchedulerOutcome {
        let scenario_name = self.shared.scenario.name().to_string();
        let max_vus = self.schedule.max_target();
        metrics.set_vus_max(&registry, &scenario_name, max_vus);

        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<u64>();
        let mut pool = Pool::new();
        let started = Instant::now();

        let mut interval = tokio::time::interval(self.options.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tick: u64 = 0;
        let mut last_tick_at = started;
        let mut last_requests = counters.requests();
        let mut last_stage: Option<usize> = None;
        let mut aborted_by = None;

        tracing::info!(
            scenario = %scenario_name,
            max_vus,
            duration = ?self.schedule.total_duration(),
            "run started"
        );

        let cause = loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(id) = exit_rx.recv() => {
                    pool.mark_exited(id);
                    if self.iterations.is_some()
                        && !pool.active.is_empty()
                        && pool.all_active_finished()
                    {
                        break StopCause::IterationsDone;
                    }
                    continue;
                }
                _ = self.interrupt.wait() => break StopCause::Interrupted,
            }

            let elapsed = started.elapsed();
            if self.schedule.is_done(elapsed) {
                break StopCause::ScheduleDone;
            }

            let target = self.schedule.target_at(elapsed);
            self.reconcile(&mut pool, target, &exit_tx);
            pool.reap_draining(Instant::now());
            metrics.set_vus(&registry, &scenario_name, pool.active.len());

            let stage = self.schedule.stage_snapshot_at(elapsed);
            if let Some(s) = &stage
                && last_stage != Some(s.index)
            {
                last_stage = Some(s.index);
                tracing::info!(
                    stage = s.index + 1,
                    stages = s.count,
                    from = s.start_target,
                    to = s.end_target,
                    "stage started"
                );
            }

            if let Some(failed) = self.check_abort_thresholds(&registry, elapsed) {
                tracing::warn!(
                    metric = %failed.metric,
                    expression = %failed.expression,
                    observed = ?failed.observed,
                    "threshold with abortOnFail crossed, stopping run"
                );
                aborted_by = Some(failed);
                break StopCause::Aborted;
            }

            if let Some(progress) = &self.progress {
                tick = tick.saturating_add(1);
                let now = Instant::now();
                let dt = now.duration_since(last_tick_at).as_secs_f64().max(1e-9);
                last_tick_at = now;
                let requests = counters.requests();
                let window = registry.take_window(HTTP_REQ_DURATION);

                progress(ProgressUpdate {
                    tick,
                    elapsed,
                    total_duration: self.schedule.total_duration(),
                    scenario: scenario_name.clone(),
                    stage,
                    live_vus: pool.active.len() as u64,
                    target_vus: target,
                    max_vus,
                    draining_vus: pool.draining.len() as u64,
                    iterations_total: counters.iterations(),
                    requests_total: requests,
                    failed_requests_total: counters.failed_requests(),
                    checks_failed_total: counters.checks_failed(),
                    rps_now: requests.saturating_sub(last_requests) as f64 / dt,
                    latency_p50_ms_now: window.p50,
                    latency_p95_ms_now: window.p95,
                });
                last_requests = requests;
            }
        };

        tracing::info!(?cause, elapsed = ?started.elapsed(), "stopping vus");
        self.stop_all(&mut pool, &mut exit_rx).await;
        metrics.set_vus(&registry, &scenario_name, 0);

        SchedulerOutcome {
            elapsed: started.elapsed(),
            aborted_by,
            interrupted: cause == StopCause::Interrupted,
            forced_stops: pool.forced_stops,
        }
    }

    fn reconcile(&self, pool: &mut Pool, target: u64, exit_tx: &mpsc::UnboundedSender<u64>) {
        let target = usize::try_from(target).unwrap_or(usize::MAX);

        while pool.active.len() < target {
            let id = pool.next_id;
            pool.next_id = pool.next_id.saturating_add(1);

            let stop = Arc::new(StopSignal::new());
            let handle = tokio::spawn(run_vu(VuContext {
                vu_id: id,
                shared: self.shared.clone(),
                stop: stop.clone(),
                iterations: self.iterations,
                think_time: self.think_time,
                exited: exit_tx.clone(),
            }));
            tracing::debug!(vu = id, "spawned vu");
            pool.active.push(LiveVu { id, stop, handle });
        }

        while pool.active.len() > target {
            pool.retire_last(self.options.graceful_ramp_down);
        }
    }

    fn check_abort_thresholds(
        &self,
        registry: &Registry,
        elapsed: Duration,
    ) -> Option<ThresholdOutcome> {
        let due: Vec<&CompiledThreshold> = self
            .abort_thresholds
            .iter()
            .filter(|t| t.delay_abort_eval.is_none_or(|d| elapsed >= d))
            .collect();
        if due.is_empty() {
            return None;
        }

        let names: Vec<&str> = due.iter().map(|t| t.selector.name.as_str()).collect();
        let snapshot = registry.snapshot_only(&names);
        due.into_iter()
            .map(|t| evaluate_one(&snapshot, t))
            // No samples yet is not a reason to abort.
            .find(|o| !o.passed && o.observed.is_some())
    }

    /// Signals every VU to stop, waits up to `graceful_stop`, then aborts the rest.
    async fn stop_all(&self, pool: &mut Pool, exit_rx: &mut mpsc::UnboundedReceiver<u64>) {
        pool.retire_all(self.options.graceful_stop);

        let deadline = tokio::time::Instant::now() + self.options.graceful_stop;
        loop {
            pool.reap_draining(Instant::now());
            if pool.draining.is_empty() {
                break;
            }
            tokio::select! {
                recv = exit_rx.recv() => {
                    if let Some(id) = recv {
                        pool.mark_exited(id);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        let leftovers = std::mem::take(&mut pool.draining);
        if !leftovers.is_empty() {
            tracing::warn!(
                count = leftovers.len(),
                grace = ?self.options.graceful_stop,
                "aborting vus still running after graceful stop"
            );
        }
        for d in leftovers {
            pool.force_stop(d.vu);
        }

        // Aborted tasks drop their in-flight requests; they must be gone before the
        // registry is frozen.
        for handle in std::mem::take(&mut pool.aborted) {
            let _ = handle.await;
        }
    }
}
