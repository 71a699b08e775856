//! Stats Context
//!
//! [`StatsContext`] owns every component and is the single entry point the host
//! drives: timer callbacks, membership events, received envelopes and consumer
//! calls. Each entry point drains the event channel before returning, so
//! subscribers see every settled change by the time control goes back to the host.

use tracing::{debug, info, instrument, warn};

use crate::api::events::{
    event_channel, EventHub, EventName, EventSource, StatEvent, SubscribeError, SubscriptionId,
};
use crate::api::facade::{ConsumerId, ConsumerRegistry, RegistrationError, StatsView};
use crate::config::{ConfigError, StatsConfig};
use crate::core::scheduler::{ManualScheduler, Scheduler, TimerAction, TimerKey};
use crate::network::broadcast::{BroadcastScheduler, LocalInputs, Outbound, StatCategory};
use crate::network::protocol::{Envelope, Payload, ProtocolError, PROTOCOL_REVISION};
use crate::roster::store::{GroupSource, GroupUnit, ReconcileReport, RosterStore, UnitTag};
use crate::stats::compute::{CombatSource, LoadoutSource};
use crate::stats::sets::SetCatalog;
use crate::stats::state::UltField;

/// Notifications from the host about the group and the local loadout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A unit joined the group.
    MemberJoined(UnitTag),
    /// A unit left the group.
    MemberLeft(UnitTag),
    /// Slots were reshuffled.
    RosterUpdated,
    /// A member went online or offline.
    ConnectionChanged {
        /// Affected slot.
        tag: UnitTag,
        /// New state.
        online: bool,
    },
    /// The local member finished loading into the world.
    PlayerActivated,
    /// Gear or bars changed.
    LoadoutChanged,
}

/// Host collaborators queried when computing local stats.
pub struct HostServices {
    /// Group enumeration.
    pub group: Box<dyn GroupSource>,
    /// Combat counters.
    pub combat: Box<dyn CombatSource>,
    /// Ultimate resource and loadout.
    pub loadout: Box<dyn LoadoutSource>,
}

/// Owns and drives every component.
pub struct StatsContext<S: Scheduler> {
    config: StatsConfig,
    scheduler: S,
    roster: RosterStore,
    broadcaster: BroadcastScheduler,
    hub: EventHub,
    events: EventSource,
    consumers: ConsumerRegistry,
    host: HostServices,
    // Set once the first newer-revision envelope has been reported.
    revision_warned: bool,
}

impl<S: Scheduler> StatsContext<S> {
    /// Build a context for the local member and run a first reconciliation.
    pub fn new(
        config: StatsConfig,
        scheduler: S,
        host: HostServices,
        local: &GroupUnit,
        outbound: Outbound,
    ) -> Result<Self, StatsError> {
        Self::with_catalog(config, scheduler, host, local, outbound, SetCatalog::default())
    }

    /// Same as [`StatsContext::new`] with a custom set catalog.
    pub fn with_catalog(
        config: StatsConfig,
        scheduler: S,
        host: HostServices,
        local: &GroupUnit,
        outbound: Outbound,
        catalog: SetCatalog,
    ) -> Result<Self, StatsError> {
        config.validate()?;

        let (sink, events) = event_channel();
        let roster = RosterStore::new(local, config.member_settle_ms, sink);
        let broadcaster = BroadcastScheduler::new(&config, catalog, outbound);

        let mut ctx = Self {
            config,
            scheduler,
            roster,
            broadcaster,
            hub: EventHub::new(),
            events,
            consumers: ConsumerRegistry::new(),
            host,
            revision_warned: false,
        };
        ctx.reconcile_now();
        info!("Stats context ready for {}", ctx.roster.local_key());
        Ok(ctx)
    }

    /// Active configuration.
    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// The host scheduler.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// The host scheduler, mutably.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Broadcast state.
    pub fn broadcaster(&self) -> &BroadcastScheduler {
        &self.broadcaster
    }

    /// Read-only access to every member's stats.
    pub fn view(&self) -> StatsView<'_> {
        StatsView::new(&self.roster)
    }

    fn reconcile_key(&self) -> TimerKey {
        TimerKey::new(format!("{}_Reconcile", self.config.timer_prefix))
    }

    fn reconcile_now(&mut self) -> ReconcileReport {
        let units = self.host.group.members();
        let report = self.roster.reconcile(&units, &mut self.scheduler);
        if !report.is_empty() {
            debug!(
                "Roster now {} members (+{} -{})",
                self.roster.len(),
                report.joined.len(),
                report.left.len()
            );
        }
        report
    }

    fn pump(&mut self) -> usize {
        self.hub.pump(&mut self.events)
    }

    /// A host timer fired.
    pub fn on_timer(&mut self, action: TimerAction) {
        self.run_timer(action);
        self.pump();
    }

    fn run_timer(&mut self, action: TimerAction) {
        let inputs = LocalInputs { combat: &*self.host.combat, loadout: &*self.host.loadout };

        match action {
            TimerAction::Settle(id) if id == self.broadcaster.loadout_cell_id() => {
                self.broadcaster.on_loadout_settled(inputs, &mut self.roster, &mut self.scheduler);
            }
            TimerAction::Settle(id) => {
                if !self.roster.settle(id) {
                    debug!("Settle for unknown container {}", id.get());
                }
            }
            TimerAction::Broadcast(kind) => {
                self.broadcaster.broadcast(kind, inputs, &mut self.roster, &mut self.scheduler);
            }
            TimerAction::Reconcile => {
                self.reconcile_now();
            }
        }
    }

    /// React to a host notification.
    pub fn handle_host_event(&mut self, event: HostEvent) {
        match &event {
            HostEvent::MemberJoined(_)
            | HostEvent::MemberLeft(_)
            | HostEvent::RosterUpdated
            | HostEvent::ConnectionChanged { .. } => {
                debug!("{:?}, reconciling in {} ms", event, self.config.reconcile_settle_ms);
                let key = self.reconcile_key();
                let delay = self.config.reconcile_settle_ms;
                self.scheduler.schedule_once(key, delay, TimerAction::Reconcile);
            }
            HostEvent::PlayerActivated => {
                let key = self.reconcile_key();
                self.scheduler.cancel(&key);
                self.reconcile_now();
            }
            HostEvent::LoadoutChanged => {
                self.broadcaster.on_loadout_changed(&mut self.scheduler);
            }
        }
        self.pump();
    }

    /// Apply an envelope received from the member in `sender`'s slot.
    #[instrument(skip(self, envelope), fields(kind = envelope.kind.as_str()))]
    pub fn receive(&mut self, sender: &UnitTag, envelope: Envelope) -> Result<(), ReceiveError> {
        let payload = match envelope.open() {
            Ok(payload) => payload,
            Err(err) => {
                if let ProtocolError::UnsupportedRevision { revision, .. } = &err {
                    if !self.revision_warned {
                        self.revision_warned = true;
                        warn!(
                            "{} is running protocol revision {} (this build reads up to {}); \
                             their stats are ignored",
                            sender, revision, PROTOCOL_REVISION
                        );
                    }
                }
                return Err(err.into());
            }
        };

        let Some(key) = self.roster.key_for_tag(sender).cloned() else {
            debug!("Envelope from unknown slot {}", sender);
            return Err(ReceiveError::UnknownSender(sender.clone()));
        };
        if &key == self.roster.local_key() {
            return Ok(());
        }
        let Some(record) = self.roster.get_mut(&key) else {
            return Err(ReceiveError::UnknownSender(sender.clone()));
        };

        let sched = &mut self.scheduler;
        match payload {
            Payload::UltType(loadout) => {
                record.ult.update(|state| loadout.apply(state), sched);
            }
            Payload::UltValue(value) => {
                record.ult.set(UltField::UltValue, value as i64, sched);
            }
            Payload::Dps(state) => {
                record.dps.update(|current| *current = state, sched);
            }
            Payload::Hps(state) => {
                record.hps.update(|current| *current = state, sched);
            }
        }

        self.pump();
        Ok(())
    }

    /// Register a consumer and enable broadcasting of its categories.
    pub fn register_consumer(
        &mut self,
        name: &str,
        categories: &[StatCategory],
    ) -> Result<ConsumerId, RegistrationError> {
        let id = self.consumers.register(name, categories).map_err(|err| {
            warn!("Rejected consumer registration: {}", err);
            err
        })?;

        for category in categories {
            self.broadcaster.enable(*category, &mut self.scheduler);
        }
        info!("Consumer {} registered for {:?}", name.trim(), categories);
        Ok(id)
    }

    /// Register a consumer from category names such as `"DPS"`.
    pub fn register_consumer_named(
        &mut self,
        name: &str,
        categories: &[&str],
    ) -> Result<ConsumerId, RegistrationError> {
        let parsed = categories
            .iter()
            .map(|c| c.parse::<StatCategory>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                warn!("Rejected consumer registration: {}", err);
                err
            })?;
        self.register_consumer(name, &parsed)
    }

    /// Registered consumers.
    pub fn consumers(&self) -> &ConsumerRegistry {
        &self.consumers
    }

    /// Subscribe a callback to one event.
    pub fn subscribe(
        &mut self,
        name: EventName,
        callback: impl FnMut(&StatEvent) + 'static,
    ) -> SubscriptionId {
        self.hub.subscribe(name, callback)
    }

    /// Subscribe by event name string.
    pub fn subscribe_named(
        &mut self,
        name: &str,
        callback: impl FnMut(&StatEvent) + 'static,
    ) -> Result<SubscriptionId, SubscribeError> {
        let name = name.parse::<EventName>()?;
        Ok(self.hub.subscribe(name, callback))
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }
}

impl StatsContext<ManualScheduler> {
    /// Run the virtual clock forward, firing everything that comes due.
    pub fn advance(&mut self, ms: u64) {
        let until = self.scheduler.now_ms() + ms;
        while let Some((_, action)) = self.scheduler.pop_due(until) {
            self.run_timer(action);
        }
        self.scheduler.set_now(until);
        self.pump();
    }
}

/// Errors on the receive path.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    /// No member occupies the sender's slot.
    #[error("no group member in slot {0}")]
    UnknownSender(UnitTag),

    /// Envelope could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Any error this crate returns.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Framing or revision problem.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Rejected consumer registration.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Rejected subscription.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// Received envelope was dropped.
    #[error(transparent)]
    Receive(#[from] ReceiveError),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use tokio::sync::mpsc;
    use tracing_subscriber::fmt::MakeWriter;

    use crate::api::events::StatPayload;
    use crate::core::bits::max_for_width;
    use crate::network::codec::encode_dps;
    use crate::network::protocol::MessageKind;
    use crate::roster::store::MemberKey;
    use crate::stats::compute::{Bar, CombatTotals, SlottedUltimate, UnitCombat};
    use crate::stats::state::{
        HpsState, MAX_DAMAGE, MAX_DPS, MAX_HPS, MAX_OVERHEAL, MAX_SET_ID, MAX_ULT_COST, MAX_ULT_ID,
        MAX_ULT_VALUE,
    };

    #[derive(Clone, Default)]
    struct Group(Rc<RefCell<Vec<GroupUnit>>>);

    impl Group {
        fn set(&self, units: Vec<GroupUnit>) {
            *self.0.borrow_mut() = units;
        }
    }

    impl GroupSource for Group {
        fn members(&self) -> Vec<GroupUnit> {
            self.0.borrow().clone()
        }
    }

    struct Combat;

    impl CombatSource for Combat {
        fn totals(&self) -> CombatTotals {
            CombatTotals {
                total_damage_out: 600_000,
                total_heal_out: 50_000,
                total_overheal_out: 10_000,
                dps_elapsed_secs: 10.0,
                hps_elapsed_secs: 10.0,
                is_boss_engagement: false,
            }
        }

        fn units(&self) -> Vec<UnitCombat> {
            vec![UnitCombat { total_damage_taken: 600_000, ..Default::default() }]
        }
    }

    #[derive(Clone, Default)]
    struct Loadout(Rc<RefCell<u32>>);

    impl LoadoutSource for Loadout {
        fn ult_power(&self) -> i64 {
            120
        }

        fn slotted_ultimate(&self, bar: Bar) -> Option<SlottedUltimate> {
            let base = *self.0.borrow();
            Some(match bar {
                Bar::Primary => SlottedUltimate { ability_id: base, cost: 200 },
                Bar::Backup => SlottedUltimate { ability_id: base + 1, cost: 250 },
            })
        }

        fn equipped_pieces(&self, _: u32) -> u32 {
            0
        }
    }

    fn ayla() -> GroupUnit {
        GroupUnit::human("group1", "Ayla", "@ayla")
    }

    fn bram() -> GroupUnit {
        GroupUnit::human("group2", "Bram", "@bram")
    }

    struct Harness {
        ctx: StatsContext<ManualScheduler>,
        group: Group,
        loadout: Loadout,
        sent: mpsc::UnboundedReceiver<Envelope>,
    }

    fn harness(local: GroupUnit) -> Harness {
        let group = Group::default();
        group.set(vec![ayla(), bram()]);
        let loadout = Loadout(Rc::new(RefCell::new(100)));
        let (tx, sent) = mpsc::unbounded_channel();
        let host = HostServices {
            group: Box::new(group.clone()),
            combat: Box::new(Combat),
            loadout: Box::new(loadout.clone()),
        };
        let ctx =
            StatsContext::new(StatsConfig::default(), ManualScheduler::new(), host, &local, tx)
                .unwrap();
        Harness { ctx, group, loadout, sent }
    }

    fn record_events(
        ctx: &mut StatsContext<ManualScheduler>,
        name: EventName,
    ) -> Rc<RefCell<Vec<StatEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        ctx.subscribe(name, move |e| sink.borrow_mut().push(e.clone()));
        log
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Vec<Envelope> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_new_reconciles_existing_group() {
        let h = harness(ayla());
        assert_eq!(h.ctx.view().member_count(), 2);
        assert!(h.ctx.view().member(&UnitTag::new("group2")).is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StatsConfig { dps_interval_ms: 0, ..StatsConfig::default() };
        let host = HostServices {
            group: Box::new(Group::default()),
            combat: Box::new(Combat),
            loadout: Box::new(Loadout::default()),
        };
        let (tx, _) = mpsc::unbounded_channel();
        let result = StatsContext::new(config, ManualScheduler::new(), host, &ayla(), tx);
        assert!(matches!(result, Err(StatsError::Config(ConfigError::ZeroInterval(_)))));
    }

    #[test]
    fn test_nothing_broadcast_without_consumers() {
        let mut h = harness(ayla());
        h.ctx.advance(30_000);
        assert!(drain(&mut h.sent).is_empty());
    }

    #[test]
    fn test_rejected_registration_changes_nothing() {
        let mut h = harness(ayla());
        assert_eq!(
            h.ctx.register_consumer("", &[StatCategory::Dps]),
            Err(RegistrationError::EmptyName)
        );
        assert!(h.ctx.register_consumer("Meter", &[]).is_err());
        assert!(matches!(
            h.ctx.register_consumer_named("Meter", &["DPS", "MANA"]),
            Err(RegistrationError::UnknownCategory(_))
        ));
        assert!(h.ctx.consumers().is_empty());
        assert!(h.ctx.broadcaster().flags().is_empty());
        assert_eq!(h.ctx.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_hps_enabled_twice_broadcasts_once_per_interval() {
        let mut h = harness(ayla());
        h.ctx.register_consumer("Meter", &[StatCategory::Hps]).unwrap();
        h.ctx.register_consumer_named("Healbot", &["hps"]).unwrap();

        h.ctx.advance(2000);
        let sent = drain(&mut h.sent);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::Hps);
    }

    #[test]
    fn test_local_broadcast_fires_player_event() {
        let mut h = harness(ayla());
        let player = record_events(&mut h.ctx, EventName::PlayerDpsUpdate);
        let group = record_events(&mut h.ctx, EventName::GroupDpsUpdate);
        h.ctx.register_consumer("Meter", &[StatCategory::Dps]).unwrap();

        h.ctx.advance(2000);
        assert!(player.borrow().is_empty());
        h.ctx.advance(100);

        assert_eq!(player.borrow().len(), 1);
        assert!(group.borrow().is_empty());
        assert_eq!(h.ctx.view().dps(&UnitTag::local()).unwrap().values.dps, 60);
    }

    #[test]
    fn test_remote_envelope_updates_group_record() {
        let mut sender = harness(ayla());
        let mut receiver = harness(bram());
        let events = record_events(&mut receiver.ctx, EventName::GroupDpsUpdate);

        sender.ctx.register_consumer("Meter", &[StatCategory::Dps]).unwrap();
        sender.ctx.advance(2000);
        let envelope = drain(&mut sender.sent).pop().unwrap();

        receiver.ctx.receive(&UnitTag::new("group1"), envelope).unwrap();
        receiver.ctx.advance(100);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, MemberKey::new("Ayla"));
        match &events[0].payload {
            StatPayload::Dps(snapshot) => assert_eq!(snapshot.values.damage, 60),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(receiver.ctx.view().dps(&UnitTag::new("group1")).unwrap().values.dps, 60);
    }

    #[test]
    fn test_remote_burst_coalesces() {
        let mut h = harness(ayla());
        let events = record_events(&mut h.ctx, EventName::GroupDpsUpdate);

        for dps in [10, 20, 30] {
            let envelope = Envelope::new(MessageKind::Dps, encode_dps(1, 5, dps));
            h.ctx.receive(&UnitTag::new("group2"), envelope).unwrap();
            h.ctx.advance(50);
        }
        h.ctx.advance(100);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            StatPayload::Dps(snapshot) => assert_eq!(snapshot.values.dps, 30),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_remote_ult_value_is_even() {
        let mut h = harness(ayla());
        h.ctx.receive(&UnitTag::new("group2"), Envelope::new(MessageKind::UltValue, 166)).unwrap();
        assert_eq!(h.ctx.view().ult(&UnitTag::new("group2")).unwrap().values.ult_value, 332);
    }

    #[test]
    fn test_echo_of_local_member_ignored() {
        let mut h = harness(ayla());
        let envelope = Envelope::new(MessageKind::Dps, encode_dps(1, 500, 500));
        assert!(h.ctx.receive(&UnitTag::local(), envelope).is_ok());
        assert!(h.ctx.receive(&UnitTag::new("group1"), envelope).is_ok());
        assert_eq!(h.ctx.view().dps(&UnitTag::local()).unwrap().values.dps, 0);
        assert_eq!(h.ctx.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_unknown_sender() {
        let mut h = harness(ayla());
        let result = h.ctx.receive(&UnitTag::new("group9"), Envelope::new(MessageKind::Hps, 0));
        assert!(matches!(
            result,
            Err(ReceiveError::UnknownSender(tag)) if tag == UnitTag::new("group9")
        ));
    }

    fn newer_revision() -> Envelope {
        Envelope {
            revision: PROTOCOL_REVISION + 1,
            ..Envelope::new(MessageKind::Dps, encode_dps(1, 9, 9))
        }
    }

    #[test]
    fn test_newer_revision_discarded() {
        let mut h = harness(ayla());

        for _ in 0..2 {
            let result = h.ctx.receive(&UnitTag::new("group2"), newer_revision());
            assert!(matches!(
                result,
                Err(ReceiveError::Protocol(ProtocolError::UnsupportedRevision { revision, .. }))
                    if revision == PROTOCOL_REVISION + 1
            ));
        }
        assert_eq!(h.ctx.view().dps(&UnitTag::new("group2")).unwrap().values.dps, 0);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl CapturedLog {
        fn count(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap()).matches(needle).count()
        }
    }

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_revision_warning_once_per_context() {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(log.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut first = harness(ayla());
            for _ in 0..3 {
                let _ = first.ctx.receive(&UnitTag::new("group2"), newer_revision());
            }
            assert_eq!(log.count("is running protocol revision"), 1);

            let mut second = harness(ayla());
            for _ in 0..3 {
                let _ = second.ctx.receive(&UnitTag::new("group2"), newer_revision());
            }
            assert_eq!(log.count("is running protocol revision"), 2);
        });
    }

    fn assert_in_range(view: StatsView<'_>, tag: &UnitTag) {
        let member = view.member(tag).unwrap();
        let (ult, dps, hps) = (member.ult.values, member.dps.values, member.hps.values);
        assert!(ult.ult_value <= MAX_ULT_VALUE);
        assert!(ult.ult1_id <= MAX_ULT_ID && ult.ult2_id <= MAX_ULT_ID);
        assert!(ult.ult1_cost <= MAX_ULT_COST && ult.ult2_cost <= MAX_ULT_COST);
        assert!(ult.activated_set_id <= MAX_SET_ID);
        assert!(dps.damage <= MAX_DAMAGE && dps.dps <= MAX_DPS);
        assert!(hps.overheal <= MAX_OVERHEAL && hps.hps <= MAX_HPS);
    }

    #[test]
    fn test_all_ones_payloads_stored_within_limits() {
        let mut h = harness(ayla());
        let tag = UnitTag::new("group2");
        for kind in MessageKind::ALL {
            h.ctx.receive(&tag, Envelope::new(kind, max_for_width(kind.width()))).unwrap();
        }
        h.ctx.advance(100);

        assert_in_range(h.ctx.view(), &tag);
        let member = h.ctx.view().member(&tag).unwrap();
        assert_eq!((member.dps.values.damage, member.dps.values.dps), (MAX_DAMAGE, MAX_DPS));
        assert_eq!(member.hps.values, HpsState { overheal: MAX_OVERHEAL, hps: MAX_HPS });
        assert_eq!(member.ult.values.ult1_cost, MAX_ULT_COST);
    }

    proptest! {
        #[test]
        fn prop_received_payloads_stay_in_range(raw in any::<u64>()) {
            let mut h = harness(ayla());
            let tag = UnitTag::new("group2");
            for kind in MessageKind::ALL {
                h.ctx.receive(&tag, Envelope::new(kind, raw)).unwrap();
            }
            assert_in_range(h.ctx.view(), &tag);
        }
    }

    #[test]
    fn test_membership_events_coalesce_into_one_reconcile() {
        let mut h = harness(ayla());
        let cara = GroupUnit::human("group3", "Cara", "@cara");
        h.group.set(vec![ayla(), bram(), cara]);

        h.ctx.handle_host_event(HostEvent::MemberJoined(UnitTag::new("group3")));
        h.ctx.advance(300);
        h.ctx.handle_host_event(HostEvent::RosterUpdated);
        h.ctx.advance(300);
        assert_eq!(h.ctx.view().member_count(), 2);

        h.ctx.advance(200);
        assert_eq!(h.ctx.view().member_count(), 3);
        assert_eq!(h.ctx.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_local_survives_churn() {
        let mut h = harness(ayla());
        for units in [vec![bram()], vec![], vec![GroupUnit::human("group4", "Dov", "@dov")]] {
            h.group.set(units);
            h.ctx.handle_host_event(HostEvent::MemberLeft(UnitTag::new("group2")));
            h.ctx.advance(500);
            assert!(h.ctx.view().member(&UnitTag::local()).is_some());
        }
        let players = h.ctx.view().iter_members().filter(|(_, m)| m.is_player).count();
        assert_eq!(players, 1);
        assert_eq!(h.ctx.view().member_count(), 2);
    }

    #[test]
    fn test_player_activated_reconciles_immediately() {
        let mut h = harness(ayla());
        h.group.set(vec![ayla()]);
        h.ctx.handle_host_event(HostEvent::PlayerActivated);
        assert_eq!(h.ctx.view().member_count(), 1);
    }

    #[test]
    fn test_loadout_change_broadcasts_ult_type_once() {
        let mut h = harness(ayla());
        h.ctx.register_consumer("Bars", &[StatCategory::Ult]).unwrap();
        h.ctx.advance(500);
        drain(&mut h.sent);

        *h.loadout.0.borrow_mut() = 300;
        h.ctx.handle_host_event(HostEvent::LoadoutChanged);
        h.ctx.advance(400);
        h.ctx.handle_host_event(HostEvent::LoadoutChanged);
        h.ctx.advance(2000);

        let ult_types: Vec<Envelope> =
            drain(&mut h.sent).into_iter().filter(|e| e.kind == MessageKind::UltType).collect();
        assert_eq!(ult_types.len(), 1);
        assert_eq!(h.ctx.view().ult(&UnitTag::local()).unwrap().values.ult1_id, 300);

        let key = h.ctx.broadcaster().timer_key(MessageKind::UltType);
        assert_eq!(h.ctx.scheduler().due_at(&key), Some(12_900));
    }

    #[test]
    fn test_subscribe_named_and_unsubscribe() {
        let mut h = harness(ayla());
        assert!(matches!(
            h.ctx.subscribe_named("GROUP_MANA_UPDATE", |_| {}),
            Err(SubscribeError::UnknownEvent(_))
        ));

        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        let id = h
            .ctx
            .subscribe_named("group_hps_update", move |_| *counter.borrow_mut() += 1)
            .unwrap();
        assert!(h.ctx.unsubscribe(id));

        h.ctx.receive(&UnitTag::new("group2"), Envelope::new(MessageKind::Hps, 7)).unwrap();
        h.ctx.advance(100);
        assert_eq!(*hits.borrow(), 0);
    }
}
