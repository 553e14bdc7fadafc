//! Property-based invariant tests for the tick scheduler and countdowns.
//!
//! ## Invariants
//!
//! 1. One ticker per granularity: armed timers == distinct granularities
//!    with at least one subscriber, and zero once everything unregisters.
//! 2. Countdown monotonicity: remaining never increases between resets and
//!    equals the duration right after one.
//! 3. Exactly-once timeout: one `on_timeout` per cycle however the clock
//!    advances.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use kiosk_core::clock::ManualClock;
use kiosk_runtime::{
    CountdownConfig, CountdownEngine, MIN_GRANULARITY_MS, Precision, TickHandle, TickScheduler,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Register(u64),
    Unregister(usize),
    Advance(u64),
}

fn arb_granularity() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), Just(16), Just(50), Just(250), Just(1_000), 1u64..2_000]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_granularity().prop_map(Op::Register),
        2 => any::<usize>().prop_map(Op::Unregister),
        2 => (0u64..3_000).prop_map(Op::Advance),
    ]
}

#[derive(Debug, Clone)]
enum Step {
    Wait(u64),
    Reset,
}

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        prop_oneof![
            6 => (0u64..1_500).prop_map(Step::Wait),
            1 => Just(Step::Reset),
        ],
        1..80,
    )
}

fn setup() -> (TickScheduler, ManualClock) {
    let clock = ManualClock::new(1_000);
    (TickScheduler::new(Rc::new(clock.clone())), clock)
}

// ── 1. One armed timer per granularity ────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn armed_iff_subscribed(ops in prop::collection::vec(arb_op(), 1..120)) {
        let (sched, clock) = setup();
        let mut live: Vec<TickHandle> = Vec::new();

        for op in ops {
            match op {
                Op::Register(g) => live.push(sched.register(g, |_| {})),
                Op::Unregister(i) => {
                    if !live.is_empty() {
                        let h = live.remove(i % live.len());
                        prop_assert!(sched.unregister(h));
                        prop_assert!(!sched.unregister(h));
                    }
                }
                Op::Advance(ms) => {
                    clock.advance(ms);
                    sched.pump();
                }
            }

            let expected: BTreeSet<u64> = live.iter().map(|h| h.granularity()).collect();
            prop_assert_eq!(sched.armed_timer_count(), expected.len());
            prop_assert_eq!(sched.granularities(), expected.iter().copied().collect::<Vec<_>>());
            prop_assert!(expected.iter().all(|&g| g >= MIN_GRANULARITY_MS));
        }

        for h in live.drain(..) {
            sched.unregister(h);
        }
        prop_assert_eq!(sched.armed_timer_count(), 0);
        prop_assert_eq!(sched.next_deadline(), None);
    }
}

// ── 2. Countdown monotonicity ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn remaining_non_increasing_between_resets(
        duration in 1_000u64..60_000,
        ms_precision in any::<bool>(),
        steps in arb_steps(),
    ) {
        let (sched, clock) = setup();
        let precision = if ms_precision { Precision::Milliseconds } else { Precision::Seconds };
        let cd = CountdownEngine::new(&sched, CountdownConfig::new(duration).precision(precision));
        let mut prev = cd.remaining_ms();
        prop_assert_eq!(prev, duration);

        for step in steps {
            match step {
                Step::Wait(ms) => {
                    clock.advance(ms);
                    sched.pump();
                    let now = cd.remaining_ms();
                    prop_assert!(now <= prev, "remaining rose from {} to {}", prev, now);
                    prev = now;
                }
                Step::Reset => {
                    cd.reset(None);
                    prev = cd.remaining_ms();
                    prop_assert_eq!(prev, duration);
                }
            }
        }
    }
}

// ── 3. Exactly-once timeout ───────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn timeout_fires_once_per_cycle(
        duration in 500u64..10_000,
        waits in prop::collection::vec(0u64..4_000, 1..60),
    ) {
        let (sched, clock) = setup();
        let fired = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&fired);
        let cd = CountdownEngine::new(&sched, CountdownConfig::new(duration))
            .on_timeout(move || f.set(f.get() + 1));

        for ms in waits {
            clock.advance(ms);
            sched.pump();
            prop_assert!(fired.get() <= 1);
        }
        clock.advance(duration + 1_000);
        sched.pump();
        prop_assert_eq!(fired.get(), 1);
        prop_assert!(cd.has_fired());
        prop_assert_eq!(cd.remaining_ms(), 0);
    }

    #[test]
    fn restarting_countdown_never_emits_zero(
        duration in 500u64..5_000,
        waits in prop::collection::vec(16u64..2_000, 1..60),
    ) {
        let (sched, clock) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _cd = CountdownEngine::new(
            &sched,
            CountdownConfig::new(duration).restart_on_timeout(true),
        )
        .on_change(move |snap| s.borrow_mut().push(snap.remaining_ms));

        for ms in waits {
            clock.advance(ms);
            sched.pump();
        }
        prop_assert!(!seen.borrow().contains(&0));
    }
}
