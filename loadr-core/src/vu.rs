use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt as _;
use tokio::sync::mpsc;

use crate::config::ThinkTime;
use crate::scenario::{CheckResult, IterationContext, VuShared};
use crate::signal::StopSignal;

/// Everything one VU task needs.
pub(crate) struct VuContext {
    pub(crate) vu_id: u64,
    pub(crate) shared: Arc<VuShared>,
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) iterations: Option<u64>,
    pub(crate) think_time: ThinkTime,
    /// Receives `vu_id` when the loop exits on its own or after a stop.
    pub(crate) exited: mpsc::UnboundedSender<u64>,
}

/// Runs scenario iterations until stopped or the iteration budget is spent.
///
/// A panicking iteration is contained: it is logged, recorded as a failed check and the
/// loop carries on.
pub(crate) async fn run_vu(ctx: VuContext) {
    tracing::debug!(vu = ctx.vu_id, "vu started");

    let mut iteration: u64 = 0;
    loop {
        if ctx.stop.is_stopped() {
            break;
        }
        if ctx.iterations.is_some_and(|n| iteration >= n) {
            break;
        }

        run_iteration(&ctx, iteration).await;
        iteration = iteration.saturating_add(1);

        let pause = ctx.think_time.sample();
        if !pause.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = ctx.stop.wait() => break,
            }
        }
    }

    tracing::debug!(vu = ctx.vu_id, iterations = iteration, "vu stopped");
    let _ = ctx.exited.send(ctx.vu_id);
}

async fn run_iteration(ctx: &VuContext, iteration: u64) {
    let started = Instant::now();
    let mut it = IterationContext::new(ctx.shared.clone(), ctx.vu_id, iteration);

    let outcome = AssertUnwindSafe(ctx.shared.scenario.run(&mut it))
        .catch_unwind()
        .await;

    match outcome {
        Ok(mut checks) => {
            // Checks made through the context but not handed back still count.
            checks.extend(it.take_checks());
            it.record_checks(&checks);
            it.record_iteration(started);
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            tracing::warn!(vu = ctx.vu_id, iteration, panic = %msg, "scenario iteration panicked");

            let mut checks = it.take_checks();
            checks.push(CheckResult {
                name: "iteration completed".to_string(),
                passed: false,
                group: it.current_group().map(str::to_string),
            });
            it.record_checks(&checks);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
