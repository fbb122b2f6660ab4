//! Delayed and fixed-rate job scheduling through the control thread.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{scheduler, wait_for_phase, wait_until};
use strand::{Actor, ActorCtx, ActorPhase};

struct Ticker {
    ticks: Arc<AtomicUsize>,
    mode: Mode,
}

enum Mode {
    Once(Duration),
    Repeating(Duration),
}

impl Actor for Ticker {
    fn on_start(&mut self, ctx: &ActorCtx<Self>) {
        match self.mode {
            Mode::Once(delay) => ctx.run_delayed(delay, |actor, _| {
                actor.ticks.fetch_add(1, Ordering::SeqCst);
            }),
            Mode::Repeating(period) => ctx.run_at_fixed_rate(period, |actor, _| {
                actor.ticks.fetch_add(1, Ordering::SeqCst);
            }),
        }
    }
}

#[test]
fn delayed_job_fires_exactly_once() {
    let scheduler = scheduler(1);
    let ticks = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.submit_actor(Ticker {
        ticks: Arc::clone(&ticks),
        mode: Mode::Once(Duration::from_millis(20)),
    });
    wait_for_phase(&handle, ActorPhase::Started);

    assert!(wait_until(|| ticks.load(Ordering::SeqCst) == 1));
    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(ticks.load(Ordering::SeqCst), 1, "one-shot timers never repeat");
    scheduler.shutdown();
}

#[test]
fn delayed_job_does_not_fire_early() {
    let scheduler = scheduler(1);
    let ticks = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.submit_actor(Ticker {
        ticks: Arc::clone(&ticks),
        mode: Mode::Once(Duration::from_millis(200)),
    });
    wait_for_phase(&handle, ActorPhase::Started);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
    assert!(wait_until(|| ticks.load(Ordering::SeqCst) == 1));
    scheduler.shutdown();
}

#[test]
fn fixed_rate_job_keeps_firing() {
    let scheduler = scheduler(1);
    let ticks = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.submit_actor(Ticker {
        ticks: Arc::clone(&ticks),
        mode: Mode::Repeating(Duration::from_millis(10)),
    });
    wait_for_phase(&handle, ActorPhase::Started);

    assert!(wait_until(|| ticks.load(Ordering::SeqCst) >= 3));
    scheduler.shutdown();
}

#[test]
fn fixed_rate_job_stops_after_close() {
    let scheduler = scheduler(1);
    let ticks = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.submit_actor(Ticker {
        ticks: Arc::clone(&ticks),
        mode: Mode::Repeating(Duration::from_millis(10)),
    });
    wait_for_phase(&handle, ActorPhase::Started);
    assert!(wait_until(|| ticks.load(Ordering::SeqCst) >= 2));

    assert!(handle.close().join(common::WAIT_BUDGET).expect("close").is_ok());
    // The in-flight arming may deliver at most one more tick before the
    // closing phase stops the chain.
    let frozen_at = ticks.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    let after = ticks.load(Ordering::SeqCst);
    assert!(
        after <= frozen_at + 1,
        "ticks kept arriving after close: {frozen_at} -> {after}"
    );
    scheduler.shutdown();
}

#[test]
fn delayed_job_for_a_closing_actor_is_dropped() {
    let scheduler = scheduler(1);
    let ticks = Arc::new(AtomicUsize::new(0));
    let handle = scheduler.submit_actor(Ticker {
        ticks: Arc::clone(&ticks),
        mode: Mode::Once(Duration::from_millis(150)),
    });
    wait_for_phase(&handle, ActorPhase::Started);
    assert!(handle.close().join(common::WAIT_BUDGET).expect("close").is_ok());

    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(
        ticks.load(Ordering::SeqCst),
        0,
        "timer fired into a closed actor"
    );
    scheduler.shutdown();
}
