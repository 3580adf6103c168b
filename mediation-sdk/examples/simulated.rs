//! Frame-loop example against the simulated backend
//!
//! Loads an interstitial and a rewarded video, shows both, and prints every
//! lifecycle event. The host owns time: each frame calls `tick`.
//!
//! Run with: cargo run -p mediation-sdk --example simulated
//! Set MEDIATION_LOG_MODE=development to see the engine's own logs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mediation_sdk::logging::init_logging_from_env;
use mediation_sdk::prelude::*;

const FRAME: Duration = Duration::from_millis(16);
const MAX_FRAMES: usize = 500;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    println!("Mediation SDK - simulated backend");
    println!("=================================");

    let mediator = Mediator::new();
    mediator.set_gdpr(true);
    mediator.set_user_consent(true);

    mediator.subscribe_all(|event: &AdEvent| {
        println!("   [{}] {:?} -> {:?}", event.format, event.kind, event.state);
    });

    // The registry is empty, so the simulator is built from these settings
    let settings = Settings::simulated().with_simulator(SimulatorConfig {
        load_latency_ms: 300,
        show_latency_ms: 800,
        reward_success_rate: 0.7,
        ..SimulatorConfig::default()
    });
    mediator.initialize(settings, &ProviderRegistry::new())?;

    mediator.request_interstitial();
    mediator.request_rewarded_video();

    let finished = Arc::new(AtomicUsize::new(0));
    let mut shown_interstitial = false;
    let mut shown_rewarded = false;

    for _ in 0..MAX_FRAMES {
        mediator.tick();

        if !shown_interstitial && mediator.is_interstitial_loaded() {
            shown_interstitial = true;
            let finished = Arc::clone(&finished);
            println!("Showing interstitial");
            mediator.show_interstitial(move |displayed| {
                println!("Interstitial finished (displayed: {})", displayed);
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        if !shown_rewarded && mediator.is_rewarded_video_loaded() {
            shown_rewarded = true;
            let finished = Arc::clone(&finished);
            println!("Showing rewarded video");
            mediator.show_rewarded_video(move |granted| {
                println!("Rewarded video finished (reward granted: {})", granted);
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        if finished.load(Ordering::SeqCst) == 2 {
            break;
        }
        thread::sleep(FRAME);
    }

    println!("\nFinal state: {:?}", mediator);
    mediator.teardown();
    Ok(())
}
