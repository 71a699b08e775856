//! Group Combat Stats demo
//!
//! Runs two members side by side on a virtual clock and passes every broadcast
//! from one to the other, logging what the receiving side sees.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use group_combat_stats::{
    stats::{Bar, CombatSource, CombatTotals, LoadoutSource, SlottedUltimate, UnitCombat},
    EventName, GroupSource, GroupUnit, HostEvent, HostServices, ManualScheduler, StatCategory,
    StatPayload, StatsConfig, StatsContext, UnitTag, VERSION,
};

/// Shared group listing both sides read from.
#[derive(Clone)]
struct SharedGroup(Rc<RefCell<Vec<GroupUnit>>>);

impl GroupSource for SharedGroup {
    fn members(&self) -> Vec<GroupUnit> {
        self.0.borrow().clone()
    }
}

/// Combat counters that grow with the demo clock.
struct ScriptedCombat {
    clock_ms: Rc<RefCell<u64>>,
    dps: u64,
}

impl CombatSource for ScriptedCombat {
    fn totals(&self) -> CombatTotals {
        let secs = *self.clock_ms.borrow() as f64 / 1000.0;
        let damage = (self.dps as f64 * secs) as u64;
        CombatTotals {
            total_damage_out: damage,
            total_heal_out: damage / 4,
            total_overheal_out: damage / 20,
            dps_elapsed_secs: secs,
            hps_elapsed_secs: secs,
            is_boss_engagement: false,
        }
    }

    fn units(&self) -> Vec<UnitCombat> {
        let secs = *self.clock_ms.borrow() as f64 / 1000.0;
        let damage = (self.dps as f64 * secs) as u64;
        vec![UnitCombat { total_damage_taken: damage, ..Default::default() }]
    }
}

struct ScriptedLoadout {
    front_ult: Rc<RefCell<u32>>,
}

impl LoadoutSource for ScriptedLoadout {
    fn ult_power(&self) -> i64 {
        250
    }

    fn slotted_ultimate(&self, bar: Bar) -> Option<SlottedUltimate> {
        match bar {
            Bar::Primary => {
                Some(SlottedUltimate { ability_id: *self.front_ult.borrow(), cost: 250 })
            }
            Bar::Backup => Some(SlottedUltimate { ability_id: 40_223, cost: 200 }),
        }
    }

    fn equipped_pieces(&self, game_set_id: u32) -> u32 {
        if game_set_id == 232 {
            5
        } else {
            0
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Group Combat Stats v{}", VERSION);
    demo_session()
}

/// Two members, one broadcasting ULT and DPS, the other listening.
fn demo_session() -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    let ayla = GroupUnit::human("group1", "Ayla", "@ayla");
    let bram = GroupUnit::human("group2", "Bram", "@bram");
    let group = SharedGroup(Rc::new(RefCell::new(vec![ayla.clone(), bram.clone()])));
    let clock = Rc::new(RefCell::new(0u64));
    let front_ult = Rc::new(RefCell::new(40_161u32));

    let config = StatsConfig::default();
    let (ayla_tx, mut ayla_rx) = mpsc::unbounded_channel();
    let (bram_tx, _bram_rx) = mpsc::unbounded_channel();

    let mut sender = StatsContext::new(
        config.clone(),
        ManualScheduler::new(),
        HostServices {
            group: Box::new(group.clone()),
            combat: Box::new(ScriptedCombat { clock_ms: clock.clone(), dps: 85_000 }),
            loadout: Box::new(ScriptedLoadout { front_ult: front_ult.clone() }),
        },
        &ayla,
        ayla_tx,
    )?;

    let mut receiver = StatsContext::new(
        config,
        ManualScheduler::new(),
        HostServices {
            group: Box::new(group),
            combat: Box::new(ScriptedCombat { clock_ms: clock.clone(), dps: 0 }),
            loadout: Box::new(ScriptedLoadout { front_ult: Rc::new(RefCell::new(0)) }),
        },
        &bram,
        bram_tx,
    )?;

    for name in [EventName::GroupUltUpdate, EventName::GroupDpsUpdate] {
        receiver.subscribe(name, |event| match &event.payload {
            StatPayload::Ult(s) => info!(
                "{} {}: ult {} / ults {} + {} / set {}",
                event.name,
                event.key,
                s.values.ult_value,
                s.values.ult1_id,
                s.values.ult2_id,
                s.values.activated_set_id
            ),
            StatPayload::Dps(s) => info!(
                "{} {}: damage {} ({:?}) at {}k dps",
                event.name, event.key, s.values.damage, s.values.damage_type, s.values.dps
            ),
            StatPayload::Hps(s) => info!("{} {}: {}k hps", event.name, event.key, s.values.hps),
        });
    }

    sender.register_consumer("DemoMeter", &[StatCategory::Ult, StatCategory::Dps])?;

    let sender_tag = UnitTag::new("group1");
    for step in 0..12u64 {
        *clock.borrow_mut() = (step + 1) * 1000;
        if step == 5 {
            info!("Ayla swaps her front bar ultimate");
            *front_ult.borrow_mut() = 38_563;
            sender.handle_host_event(HostEvent::LoadoutChanged);
        }

        sender.advance(1000);
        while let Ok(envelope) = ayla_rx.try_recv() {
            info!("wire: {}", envelope.to_json()?);
            receiver.receive(&sender_tag, envelope)?;
        }
        receiver.advance(1000);
    }

    info!("=== Final View (Bram's side) ===");
    for (key, member) in receiver.view().all_members() {
        info!(
            "{} ({}) player={} ult={} dps={}k",
            key,
            member.display_name,
            member.is_player,
            member.ult.values.ult_value,
            member.dps.values.dps
        );
    }

    Ok(())
}
