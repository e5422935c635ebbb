//! A small game-server loop on the background dispatch runtime.
//!
//! Demonstrates: two players scheduling attacks and a regeneration ticker,
//! an expedited spell, a delayed move, a follow-up scheduled from inside
//! an action, and a disconnect that cancels everything the player owns.
//!
//! Run with `RUST_LOG=tempo_engine=debug` to see the scheduler's logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempo_core::{EventKind, RequestorId};
use tempo_engine::{ChannelObserver, DispatchRuntime, Event, Scheduler, SchedulerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const ATTACK: EventKind = EventKind::new("attack");
const REGEN: EventKind = EventKind::new("regen");
const SPELL: EventKind = EventKind::new("spell");
const MOVE: EventKind = EventKind::new("movement");

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Tempo Game Loop Example ===\n");

    let scheduler = Scheduler::with_system_clock(SchedulerConfig {
        max_idle_wait: ms(10),
        ..SchedulerConfig::default()
    })
    .unwrap();
    let (observer, fired) = ChannelObserver::new();
    scheduler.add_fire_observer(Arc::new(observer));
    let mut runtime = DispatchRuntime::start(scheduler.clone()).unwrap();

    let alice = RequestorId(1);
    let bob = RequestorId(2);
    let hp = Arc::new(AtomicU64::new(50));

    // Bob regenerates 5 HP every 100ms until full, then stops himself.
    let regen_hp = Arc::clone(&hp);
    let regen = Event::builder(move |ctx| {
        let now = regen_hp.fetch_add(5, Ordering::SeqCst) + 5;
        info!(hp = now, tick = ctx.fire_count(), "bob regenerates");
        if now >= 100 {
            ctx.cancel_repeats();
        }
        Ok(())
    })
    .requestor(bob)
    .kind(REGEN)
    .repeat_every(ms(100))
    .build();
    scheduler.schedule_event(&regen, Some(ms(100))).unwrap();

    // Alice swings every 300ms; each hit schedules the next swing.
    fn swing(hp: Arc<AtomicU64>, attacker: RequestorId) -> Arc<Event> {
        Event::builder(move |ctx| {
            let left = hp
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_sub(12)))
                .unwrap_or_else(|v| v)
                .saturating_sub(12);
            info!(hp = left, late = ?ctx.latency(), "alice hits bob");
            let next = swing(Arc::clone(&hp), attacker);
            ctx.scheduler()
                .schedule_event(&next, Some(Duration::from_millis(300)))
                .map_err(|e| tempo_core::ActionError::failed(e.to_string()))
        })
        .requestor(attacker)
        .kind(ATTACK)
        .build()
    }
    scheduler
        .schedule_event(&swing(Arc::clone(&hp), alice), Some(ms(300)))
        .unwrap();

    // Bob casts a slow spell, then hastes it.
    let spell = Event::builder(|_| {
        info!("bob's spell resolves");
        Ok(())
    })
    .requestor(bob)
    .kind(SPELL)
    .build();
    let spell_notices = spell.subscribe();
    scheduler.schedule_event(&spell, Some(Duration::from_secs(5))).unwrap();
    println!("spell due in {:?}", scheduler.calculate_time_to_fire(&spell));
    thread::sleep(ms(150));
    spell.expedite();

    // Alice's move gets pushed back by a stun.
    let step = Event::builder(|_| {
        info!("alice moves");
        Ok(())
    })
    .requestor(alice)
    .kind(MOVE)
    .build();
    scheduler.schedule_event(&step, Some(ms(200))).unwrap();
    step.delay(ms(400));

    thread::sleep(ms(1_000));

    // Alice disconnects: everything she owns is cancelled.
    let dropped = scheduler.cancel_all_for(alice, None).unwrap();
    println!("\nalice disconnected, {dropped} pending event(s) cancelled");

    thread::sleep(ms(300));
    let report = runtime.shutdown();

    println!("\nspell notices:");
    for notice in spell_notices.try_iter() {
        println!("  {notice:?}");
    }

    let mut per_kind = std::collections::BTreeMap::<&str, usize>::new();
    for notice in fired.try_iter() {
        *per_kind.entry(notice.event.kind().name()).or_default() += 1;
    }
    println!("\nfirings by kind: {per_kind:?}");

    let m = scheduler.metrics();
    println!(
        "\nscheduled={} fired={} repeats={} cancelled={} expedited={} delayed={}",
        m.scheduled, m.fired, m.repeats, m.cancelled, m.expedited, m.delayed
    );
    println!(
        "shutdown in {}ms, dispatch joined: {}, left pending: {}",
        report.total_ms, report.dispatch_joined, report.pending_events
    );
}
