//! Simulated playback example
//!
//! Plays a manifest on the in-memory host, survives a network error and
//! prints every state change.
//!
//! Run with: cargo run -p chill-core --example simulated_playback

use chill_core::format::format_time;
use chill_core::platform::{EngineErrorKind, EngineEvent};
use chill_core::sim::SimHost;
use chill_core::{PlaybackSession, PlaybackSource, PlayerConfig, SessionCallbacks};
use std::time::Duration;

fn main() {
    println!("Chill Core - Simulated Playback Example");
    println!("=======================================\n");

    let sim = SimHost::new();
    let callbacks = SessionCallbacks::new()
        .on_ended(|| println!("-> episode ended"))
        .on_fallback(|request| println!("-> fallback requested: {:?}", request));

    let mut session = PlaybackSession::new(
        sim.host(),
        PlaybackSource::new("https://cdn.example.com/phim/tap-01/index.m3u8"),
        PlayerConfig::default(),
        callbacks,
    );
    let mut updates = session.subscribe();

    let mut print = || {
        if updates.has_changed().unwrap_or(false) {
            let state = updates.borrow_and_update();
            println!(
                "[{:>6} ms] {:<9} {} / {}  retries={} levels={}",
                sim.scheduler.now().as_millis(),
                state.status.to_string(),
                format_time(state.position),
                format_time(state.duration),
                state.retry_count,
                state.levels.len(),
            );
        }
    };

    sim.pump(&mut session);
    print();

    for _ in 0..4 {
        sim.media.tick(15.0);
        sim.advance(&mut session, Duration::from_secs(15));
        print();
    }

    println!("\nInjecting a fatal network error...");
    if let Some(engine) = sim.engines.current() {
        sim.engines.emit(
            engine,
            EngineEvent::Error {
                fatal: true,
                kind: EngineErrorKind::Network,
                details: "fragLoadError".into(),
            },
        );
    }
    sim.pump(&mut session);
    print();
    sim.advance(&mut session, Duration::from_secs(1));
    println!("Recovery restarted loading at {:?}", sim.engines.log().start_loads);

    println!("\nSeeking near the end...");
    session.seek(session.state().duration - 5.0);
    sim.pump(&mut session);
    print();

    sim.media.finish();
    sim.pump(&mut session);
    print();
}
