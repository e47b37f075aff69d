//! Scripted combat scenarios through the public session API.
//!
//! Every roll is queued up front with `ScriptedDice`, so each test knows
//! exactly which d20 and damage faces the engine will see.

use crawler_core::buffs::{self, ActiveBuff, BuffKind};
use crawler_core::combatant::{Condition, Skill, SkillTarget};
use crawler_core::damage::DamageType;
use crawler_core::dice::{DamageDice, DieType};
use crawler_core::sync::Immediate;
use crawler_core::testing::{self, assert_down, assert_hp, assert_turn_of, id_of, RecordingAck, ScriptedDice};
use crawler_core::{Combatant, CombatError, CombatPhase, CombatSession, EngineConfig, PlayerAction, PostCombatPhase};

fn session(party: Vec<Combatant>, encounter: Vec<Combatant>, dice: ScriptedDice) -> CombatSession {
    CombatSession::with_dice(party, encounter, EngineConfig::default(), Box::new(dice))
        .expect("Session should start")
}

/// A goblin with 30 HP so one blow does not end the fight.
fn ogre() -> Combatant {
    let mut ogre = testing::goblin("Ogre");
    ogre.hit_points.maximum = 30;
    ogre.hit_points.current = 30;
    ogre
}

// =============================================================================
// TEST 1: One fireball, three kills, three drops
// =============================================================================

#[tokio::test]
async fn test_area_spell_kills_collect_every_drop() {
    // Each goblin fails its DEX save on a 2 and takes 6+6+6 + 4 fire.
    let dice = ScriptedDice::new([2, 6, 6, 6, 2, 6, 6, 6, 2, 6, 6, 6]);
    let mut s = session(
        vec![testing::wizard("Elara")],
        vec![testing::goblin("Snik"), testing::goblin("Grik"), testing::goblin("Mog")],
        dice,
    );
    assert_turn_of(&s, "Elara");

    let mut ack = RecordingAck::default();
    s.act(PlayerAction::UseSkill { skill: 0, target: None }, &mut ack)
        .await
        .expect("Fireball should resolve");

    assert_eq!(
        ack.labels(),
        vec![
            "saving throw",
            "damage result",
            "saving throw",
            "damage result",
            "saving throw",
            "damage result"
        ]
    );
    for name in ["Snik", "Grik", "Mog"] {
        assert_down(&s, name);
    }
    assert_eq!(s.phase(), CombatPhase::Victory);
    assert_eq!(s.experience_pool(), 150);

    let mut sources: Vec<&str> = s.loot().iter().map(|l| l.source.as_str()).collect();
    sources.sort_unstable();
    assert_eq!(sources, vec!["Grik", "Mog", "Snik"]);
    assert_eq!(s.pending_loot().count(), 3);
}

// =============================================================================
// TEST 2: Validation happens before anything is rolled
// =============================================================================

#[tokio::test]
async fn test_cooldown_and_down_target_rejected() {
    let dice = ScriptedDice::new([15, 1, 1, 1, 15, 1, 1]);
    let mut s = session(
        vec![testing::fighter("Roland")],
        vec![testing::goblin("Snik"), testing::goblin("Grik")],
        dice,
    );
    let snik = id_of(&s, "Snik");

    // Power Strike: 1 + 2 + 4 - 2 = 5.
    s.act(
        PlayerAction::UseSkill {
            skill: 0,
            target: Some(snik),
        },
        &mut Immediate,
    )
    .await
    .unwrap();
    assert_hp(&s, "Snik", 2, 7);

    s.run_until_player_turn(&mut Immediate).await.unwrap();
    assert_turn_of(&s, "Roland");

    let err = s
        .select_action(PlayerAction::UseSkill {
            skill: 0,
            target: Some(snik),
        })
        .unwrap_err();
    assert_eq!(
        err,
        CombatError::SkillUnavailable {
            name: "Power Strike".into(),
            turns: 1
        }
    );

    s.act(PlayerAction::Attack { target: snik }, &mut Immediate).await.unwrap();
    assert_down(&s, "Snik");
    s.run_until_player_turn(&mut Immediate).await.unwrap();

    let before = s.roster().to_vec();
    let err = s.select_action(PlayerAction::Attack { target: snik }).unwrap_err();
    assert!(matches!(err, CombatError::InvalidTarget(_)));
    assert_eq!(s.roster(), &before[..]);

    // Cooldown has run out by the third turn.
    s.select_action(PlayerAction::UseSkill {
        skill: 0,
        target: Some(id_of(&s, "Grik")),
    })
    .expect("Power Strike should be ready again");
}

// =============================================================================
// TEST 3: Frozen combatants lose their turn
// =============================================================================

#[tokio::test]
async fn test_frozen_monster_skips_turn() {
    let mut ogre = testing::goblin("Ogre");
    ogre.hit_points.maximum = 30;
    ogre.hit_points.current = 30;
    // Ray of Frost: 15 + 5 hits AC 12, then 1 + 4 cold.
    let mut s = session(vec![testing::wizard("Elara")], vec![ogre], ScriptedDice::new([15, 1]));
    let ogre = id_of(&s, "Ogre");

    let events = s
        .act(
            PlayerAction::UseSkill {
                skill: 1,
                target: Some(ogre),
            },
            &mut Immediate,
        )
        .await
        .unwrap();

    assert_hp(&s, "Ogre", 25, 30);
    assert!(events.iter().any(|e| e.effect_text.as_deref() == Some("Frozen for 1 round(s)")));

    // The ogre's turn was skipped and the condition ran out at the round
    // boundary.
    assert_turn_of(&s, "Elara");
    assert_eq!(s.round(), 2);
    let skipped = s
        .log()
        .events()
        .iter()
        .any(|e| e.actor_name == "Ogre" && e.effect_text.as_deref() == Some("Frozen and cannot act"));
    assert!(skipped);
    assert!(!s.combatant(ogre).unwrap().has_condition(Condition::Frozen));
}

// =============================================================================
// TEST 4: Support skills
// =============================================================================

#[tokio::test]
async fn test_heal_and_party_buff() {
    let mut roland = testing::fighter("Roland");
    roland.hit_points.current = 4;
    let mut s = session(
        vec![roland, testing::cleric("Mira")],
        vec![testing::goblin("Snik")],
        // Cure Wounds 5 + 3, then the goblin misses.
        ScriptedDice::new([5, 1]),
    );
    let roland = id_of(&s, "Roland");
    let mira = id_of(&s, "Mira");

    s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();
    assert_turn_of(&s, "Mira");

    let events = s
        .act(
            PlayerAction::UseSkill {
                skill: 0,
                target: Some(roland),
            },
            &mut Immediate,
        )
        .await
        .unwrap();
    assert_hp(&s, "Roland", 12, 12);
    assert_eq!(events[0].heal, Some(8));

    // Healing a goblin is not allowed.
    s.run_until_player_turn(&mut Immediate).await.unwrap();
    s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();
    let err = s
        .select_action(PlayerAction::UseSkill {
            skill: 0,
            target: Some(id_of(&s, "Snik")),
        })
        .unwrap_err();
    assert!(matches!(err, CombatError::InvalidTarget(_)));

    s.act(PlayerAction::UseSkill { skill: 1, target: None }, &mut Immediate)
        .await
        .unwrap();
    for id in [roland, mira] {
        let hero = s.combatant(id).unwrap();
        let bless = hero.buffs.iter().find(|b| b.kind == BuffKind::Attack).unwrap();
        assert_eq!(bless.owner, mira);
        assert_eq!(bless.turns_remaining, 3);
    }
    assert_eq!(s.combatant(roland).unwrap().stats.attack, 16);
}

// =============================================================================
// TEST 5: Thorns answer a weapon blow
// =============================================================================

#[tokio::test]
async fn test_thorns_reflect_weapon_damage() {
    let mut roland = testing::fighter("Roland");
    roland.player_profile_mut().unwrap().passives.thorns_percent = 50;
    // Goblin: 15 + 2 meets AC 17; scimitar 6 + 2 - 4 defense = 4.
    let mut s = session(vec![roland], vec![testing::goblin("Snik")], ScriptedDice::new([15, 6]));

    s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();
    let events = s.run_until_player_turn(&mut Immediate).await.unwrap();

    assert_hp(&s, "Roland", 8, 12);
    assert_hp(&s, "Snik", 5, 7);
    let reflect = events.iter().find(|e| e.action == "Reflect").unwrap();
    assert_eq!(reflect.actor_name, "Roland");
    assert_eq!(reflect.damage, Some(2));
}

// =============================================================================
// TEST 6: Defeat
// =============================================================================

#[tokio::test]
async fn test_defeat_ends_in_game_over() {
    let mut roland = testing::fighter("Roland");
    roland.hit_points.current = 1;
    let mut s = session(vec![roland], vec![testing::goblin("Snik")], ScriptedDice::new([15, 6]));

    s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();
    s.run_until_player_turn(&mut Immediate).await.unwrap();

    assert_eq!(s.phase(), CombatPhase::Defeat);
    assert!(s.is_over());
    assert_eq!(
        s.select_action(PlayerAction::Pass).unwrap_err(),
        CombatError::CombatOver
    );
    let closure = s.finish().expect("Defeat needs no loot assignment");
    assert!(!closure.result.is_victory());
    assert_eq!(closure.next_phase, PostCombatPhase::GameOver);
    assert!(closure.level_ups.is_empty());
}

// =============================================================================
// TEST 7: Multi-hit skills roll every hit on its own
// =============================================================================

#[tokio::test]
async fn test_multi_hit_skill_rolls_each_hit() {
    let roland = testing::fighter("Roland").with_skill(
        Skill::new("Flurry", SkillTarget::SingleEnemy, 0)
            .with_damage(DamageDice::new(1, DieType::D4, 0), DamageType::Slashing)
            .with_hits(3),
    );
    // Hit for 3 + 4 - 2, fumble, then hit for 2 + 4 - 2.
    let mut s = session(vec![roland], vec![ogre()], ScriptedDice::new([15, 3, 1, 12, 2]));
    let ogre = id_of(&s, "Ogre");

    let mut ack = RecordingAck::default();
    let events = s
        .act(
            PlayerAction::UseSkill {
                skill: 2,
                target: Some(ogre),
            },
            &mut ack,
        )
        .await
        .unwrap();

    assert_hp(&s, "Ogre", 21, 30);
    assert_eq!(
        ack.labels(),
        vec!["attack roll", "damage result", "attack roll", "attack roll", "damage result"]
    );
    let damage: Vec<i32> = events
        .iter()
        .filter(|e| e.action == "Flurry")
        .filter_map(|e| e.damage)
        .collect();
    assert_eq!(damage, vec![5, 4]);
    assert!(events
        .iter()
        .any(|e| e.action == "Flurry" && e.effect_text.as_deref() == Some("Critical miss")));
}

// =============================================================================
// TEST 8: Passive evasion turns a hit into a miss
// =============================================================================

#[tokio::test]
async fn test_evasion_dodges_a_hit() {
    let mut roland = testing::fighter("Roland");
    roland.player_profile_mut().unwrap().passives.evasion_percent = 50;
    // Goblin: 15 + 2 meets AC 17, then the evasion check succeeds.
    let dice = ScriptedDice::new([15]).with_chances([true]);
    let mut s = session(vec![roland], vec![testing::goblin("Snik")], dice);

    s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();
    let events = s.run_until_player_turn(&mut Immediate).await.unwrap();

    assert_hp(&s, "Roland", 12, 12);
    let swing = events.iter().find(|e| e.actor_name == "Snik").unwrap();
    assert_eq!(swing.effect_text.as_deref(), Some("Evaded"));
    assert_eq!(swing.damage, None);
}

// =============================================================================
// TEST 9: Passive critical and lifesteal
// =============================================================================

#[tokio::test]
async fn test_passive_critical_and_lifesteal() {
    let mut roland = testing::fighter("Roland");
    roland.hit_points.current = 4;
    let passives = &mut roland.player_profile_mut().unwrap().passives;
    passives.critical_percent = 50;
    passives.lifesteal_percent = 50;
    // 15 + 5 hits without a natural 20; the passive makes it critical.
    // (5 + 4) x 2 - 2 = 16, half of it comes back.
    let dice = ScriptedDice::new([15, 5]).with_chances([true]);
    let mut s = session(vec![roland], vec![ogre()], dice);
    let ogre = id_of(&s, "Ogre");

    let events = s
        .act(PlayerAction::Attack { target: ogre }, &mut Immediate)
        .await
        .unwrap();

    assert_hp(&s, "Ogre", 14, 30);
    assert_hp(&s, "Roland", 12, 12);
    let blow = events.iter().find(|e| e.damage.is_some()).unwrap();
    assert_eq!(blow.damage, Some(16));
    assert!(blow.effect_text.as_deref().unwrap_or_default().contains("Critical hit!"));
    let drain = events.iter().find(|e| e.action == "Lifesteal").unwrap();
    assert_eq!(drain.heal, Some(8));
}

// =============================================================================
// TEST 10: Passive regeneration at the start of each turn
// =============================================================================

#[tokio::test]
async fn test_passive_regeneration_each_turn() {
    let mut roland = testing::fighter("Roland");
    roland.hit_points.current = 5;
    roland.player_profile_mut().unwrap().passives.regeneration = 3;
    // Both goblin swings are natural 1s.
    let mut s = session(vec![roland], vec![testing::goblin("Snik")], ScriptedDice::new([1, 1]));

    // The first turn opened when the fight started.
    assert_hp(&s, "Roland", 8, 12);
    assert_eq!(s.log().last().and_then(|e| e.heal), Some(3));

    s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();
    s.run_until_player_turn(&mut Immediate).await.unwrap();
    assert_hp(&s, "Roland", 11, 12);

    // Capped at the maximum.
    s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();
    let events = s.run_until_player_turn(&mut Immediate).await.unwrap();
    assert_hp(&s, "Roland", 12, 12);
    let regen = events.iter().find(|e| e.action == "Regeneration").unwrap();
    assert_eq!(regen.heal, Some(1));
}

// =============================================================================
// TEST 11: A poison tick can end the fight
// =============================================================================

#[tokio::test]
async fn test_poison_tick_ends_the_fight() {
    let mut snik = testing::goblin("Snik");
    snik.hit_points.current = 2;
    let owner = snik.id;
    buffs::apply_buff(&mut snik, ActiveBuff::new(BuffKind::Poison, 3, owner, 2, "Venom"));
    let mut s = session(vec![testing::fighter("Roland")], vec![snik], ScriptedDice::default());

    let events = s.act(PlayerAction::Pass, &mut Immediate).await.unwrap();

    assert_down(&s, "Snik");
    assert_eq!(s.phase(), CombatPhase::Victory);
    assert_eq!(s.experience_pool(), 50);
    assert_eq!(s.loot().len(), 1);
    let tick = events.iter().find(|e| e.action == "Poison").unwrap();
    assert_eq!(tick.actor_name, "Snik");
    assert_eq!(tick.damage, Some(2));
    assert!(events.iter().any(|e| e.action == "Defeated"));
    assert_eq!(events.last().map(|e| e.action.as_str()), Some("Victory"));
}
