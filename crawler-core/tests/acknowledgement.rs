//! Acknowledgement modes only change pacing, never results.

use std::time::Duration;

use crawler_core::outcome::LootItem;
use crawler_core::sync::{AutoAdvance, Immediate, ManualAdvance};
use crawler_core::testing::{self, RecordingAck};
use crawler_core::{AckMode, Acknowledge, CombatClosure, CombatResult, Combatant, EngineConfig, HeadlessCombat};

fn party() -> Vec<Combatant> {
    vec![testing::fighter("Roland"), testing::cleric("Mira"), testing::wizard("Elara")]
}

fn encounter() -> Vec<Combatant> {
    vec![testing::goblin("Snik"), testing::goblin("Grik"), testing::goblin("Mog")]
}

async fn play(party: &[Combatant], encounter: &[Combatant], ack: &mut dyn Acknowledge) -> CombatClosure {
    HeadlessCombat::new(party.to_vec(), encounter.to_vec(), EngineConfig::new().with_seed(21))
        .expect("Combat should start")
        .run_with(ack)
        .await
        .expect("Combat should finish")
}

#[track_caller]
fn assert_same_outcome(a: &CombatClosure, b: &CombatClosure) {
    // Item ids are fresh per drop, so compare loot by name.
    match (&a.result, &b.result) {
        (
            CombatResult::Victory { loot: la, experience: xa },
            CombatResult::Victory { loot: lb, experience: xb },
        ) => {
            assert_eq!(xa, xb);
            let names = |loot: &[LootItem]| loot.iter().map(|l| l.item.name.clone()).collect::<Vec<_>>();
            assert_eq!(names(la), names(lb));
        }
        (CombatResult::Defeat, CombatResult::Defeat) => {}
        (x, y) => panic!("results differ: {x:?} vs {y:?}"),
    }
    assert_eq!(a.next_phase, b.next_phase);
    assert_eq!(a.log, b.log);
    for (x, y) in a.party.iter().zip(&b.party) {
        assert_eq!(x.name, y.name);
        assert_eq!(x.hit_points, y.hit_points);
        assert_eq!(
            x.player_profile().map(|p| p.experience),
            y.player_profile().map(|p| p.experience)
        );
    }
}

// =============================================================================
// TEST 1: Manual with queued proceeds matches Immediate
// =============================================================================

#[tokio::test]
async fn test_manual_matches_immediate() {
    let (party, encounter) = (party(), encounter());
    let baseline = play(&party, &encounter, &mut Immediate).await;

    let (mut manual, handle) = ManualAdvance::channel();
    for _ in 0..10_000 {
        assert!(handle.proceed());
    }
    let manual_run = play(&party, &encounter, &mut manual).await;

    assert_same_outcome(&baseline, &manual_run);
}

// =============================================================================
// TEST 2: A presentation task pressing proceed
// =============================================================================

#[tokio::test]
async fn test_manual_driven_by_another_task() {
    let (party, encounter) = (party(), encounter());
    let baseline = play(&party, &encounter, &mut Immediate).await;

    let (mut manual, handle) = ManualAdvance::channel();
    let presenter = tokio::spawn(async move {
        let mut pressed = 0u32;
        while handle.proceed() {
            pressed += 1;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        pressed
    });

    let manual_run = play(&party, &encounter, &mut manual).await;
    drop(manual);
    let pressed = presenter.await.unwrap();

    assert_same_outcome(&baseline, &manual_run);
    assert!(pressed > 0);
}

// =============================================================================
// TEST 3: Auto advance waits on the clock
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_auto_advance_matches_immediate() {
    let (party, encounter) = (party(), encounter());
    let baseline = play(&party, &encounter, &mut Immediate).await;

    let started = tokio::time::Instant::now();
    let mut auto = AutoAdvance::from_millis(800);
    let auto_run = play(&party, &encounter, &mut auto).await;

    assert_same_outcome(&baseline, &auto_run);
    let mut recorder = RecordingAck::default();
    play(&party, &encounter, &mut recorder).await;
    assert!(started.elapsed() >= Duration::from_millis(800) * recorder.points.len() as u32);
}

// =============================================================================
// TEST 4: Config-driven runs
// =============================================================================

#[tokio::test]
async fn test_manual_config_without_presenter_runs_through() {
    let (party, encounter) = (party(), encounter());
    let baseline = play(&party, &encounter, &mut Immediate).await;

    let config = EngineConfig::new()
        .with_seed(21)
        .with_acknowledgement(AckMode::Manual);
    let closure = HeadlessCombat::new(party.clone(), encounter.clone(), config)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_same_outcome(&baseline, &closure);
}
