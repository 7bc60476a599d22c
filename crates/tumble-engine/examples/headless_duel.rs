//! Headless group-clear duel driven through a room task.
//!
//! Two scripted players drop pieces at different rates; the inputs for one
//! of them arrive several ticks late, which exercises rollback. At the end
//! the room's state is exported and re-verified from its replay log.
//!
//! Run with: `RUST_LOG=tumble_engine=debug cargo run --example headless_duel`

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tumble_core::prelude::*;
use tumble_engine::prelude::*;

const TICKS: u64 = 600;
const LAG: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = GameOptions {
        stepper_name: "puyo-duel".to_owned(),
        seed: Some([2024, 7, 11, 3, 0]),
        ..Default::default()
    };
    let engine = Engine::initialize(options, EngineConfig::default())
        .context("failed to build the duel engine")?;
    let room = spawn_room("headless", engine);

    let mut chains = 0;
    let mut game_over = None;
    for tick in 1..=TICKS {
        // Player 0 plays on time.
        if tick % 4 == 0 {
            room.add_event(Event::for_player(tick + 1, 0, EventKind::DropPiece))
                .await?;
        }
        // Player 1's inputs reach the room LAG ticks after they were made.
        if tick > LAG && (tick - LAG) % 6 == 0 {
            let made_at = tick - LAG;
            let dx = if made_at % 12 == 0 { 1 } else { -1 };
            room.add_event(Event::for_player(made_at, 1, EventKind::MovePiece { dx }))
                .await?;
            room.add_event(Event::for_player(made_at, 1, EventKind::DropPiece))
                .await?;
        }

        let report = room.step().await?;
        for effect in &report.effects {
            match &effect.kind {
                EffectKind::ChainDone { chain } if *chain > 1 => {
                    chains += 1;
                    tracing::info!(tick = effect.time, player = ?effect.player, chain, "chain");
                }
                EffectKind::GameOver => game_over = Some((effect.time, effect.player)),
                _ => {}
            }
        }
        if game_over.is_some() {
            break;
        }
    }

    let exported = room.export().await?;
    room.shutdown().await?;

    let mut engine = Engine::unserialize(&exported).context("exported engine did not load")?;
    let log = engine.record_replay(30)?;
    let result = verify_replay(engine.stepper(), &log)?;
    anyhow::ensure!(
        result.completed,
        "replay diverged: {:?}",
        result.first_divergence
    );

    println!(
        "ticks={} chains={} game_over={:?} replay_ok={} hash={}",
        engine.time(),
        chains,
        game_over,
        result.completed,
        engine.state_hash()?
    );
    Ok(())
}
