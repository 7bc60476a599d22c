//! The rollback engine: event log, state cache and effect notification.
//!
//! The engine keeps three pieces of bookkeeping:
//!
//! - `events`: every accepted event, bucketed by the tick that consumes it.
//!   Buckets are kept in canonical order, so two engines that received the
//!   same events in different orders hold identical logs.
//! - `cache`: consecutive ticks of derived state, at most `cache_size` of
//!   them. The genesis state lives outside the cache in a hashed
//!   [`Snapshot`] so the engine can always fall back to a full replay.
//! - `last_valid`: the newest tick whose cached state is still correct.
//!
//! Adding an event at tick `t` makes `S_{t-1}` the newest valid state. If
//! that state has already been evicted, the cache is dropped and the next
//! query replays from genesis. Queries (`step`, `current_state`,
//! `call_stepper`, ...) re-derive every tick between `last_valid` and the
//! requested one, storing each state as they go.
//!
//! Effects are content-addressed. A tick that is replayed after a rollback
//! re-emits its effects, and any effect whose hash was already delivered
//! for that tick is suppressed, so listeners see each distinct effect once.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tumble_core::effect::Effect;
use tumble_core::event::Event;
use tumble_core::options::GameOptions;
use tumble_core::snapshot::Snapshot;
use tumble_core::stepper::Stepper;

use crate::bundle::{CacheBundle, EngineBundle, ReplayLog, ReplayRecorder, StateBundle};
use crate::registry::AnyStepper;
use crate::{EngineConfig, EngineError};

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Handle returned by [`Engine::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback = Box<dyn FnMut(&Effect) + Send>;

/// What was already delivered for one tick.
#[derive(Debug, Default)]
struct Delivered {
    /// Content hashes of the effects handed out.
    hashes: BTreeSet<String>,
    /// Filtered listeners that already fired.
    fired: BTreeSet<ListenerId>,
}

struct Listener {
    id: ListenerId,
    effect_type: String,
    filtered: bool,
    callback: Callback,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Event-sourced simulation over one [`Stepper`].
pub struct Engine<S: Stepper> {
    stepper: S,
    config: EngineConfig,
    genesis: Snapshot<S::State>,
    events: BTreeMap<u64, Vec<Event>>,
    cache: BTreeMap<u64, S::State>,
    last_valid: u64,
    time: u64,
    /// Delivery record per tick, kept only for ticks newer than the oldest
    /// cached state.
    delivered: BTreeMap<u64, Delivered>,
    listeners: Vec<Listener>,
    next_listener: u64,
    buffered: VecDeque<Effect>,
}

impl<S: Stepper> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("stepper", &self.stepper.name())
            .field("genesis", &self.genesis.time)
            .field("time", &self.time)
            .field("last_valid", &self.last_valid)
            .field("cached", &self.cache.len())
            .field("event_ticks", &self.events.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Engine<AnyStepper> {
    /// Build the stepper named by `options.stepper_name` and its genesis.
    ///
    /// # Errors
    ///
    /// Fails for unknown stepper names and invalid options.
    pub fn initialize(options: GameOptions, config: EngineConfig) -> Result<Self, EngineError> {
        let stepper = AnyStepper::from_options(options)?;
        Self::new(stepper, config)
    }

    /// Rebuild an engine from [`Engine::serialize`] output.
    ///
    /// The stepper is reconstructed from the name and options in the bundle.
    pub fn unserialize(json: &str) -> Result<Self, EngineError> {
        let bundle: EngineBundle<<AnyStepper as Stepper>::State> = serde_json::from_str(json)?;
        let stepper = AnyStepper::from_name(&bundle.stepper, bundle.options.clone())?;
        Self::from_bundle(stepper, bundle)
    }
}

impl<S: Stepper> Engine<S> {
    /// Create an engine at the stepper's genesis state.
    pub fn new(stepper: S, config: EngineConfig) -> Result<Self, EngineError> {
        let state = stepper.initialize_state()?;
        let genesis = Snapshot::capture(stepper.time(&state), state);
        tracing::debug!(
            stepper = stepper.name(),
            genesis = genesis.time,
            hash = %genesis.hash,
            "engine initialized"
        );
        Ok(Self::with_genesis(stepper, config, genesis))
    }

    fn with_genesis(stepper: S, config: EngineConfig, genesis: Snapshot<S::State>) -> Self {
        let config = EngineConfig {
            cache_size: config.cache_size.max(1),
            ..config
        };
        let mut engine = Self {
            stepper,
            config,
            time: genesis.time,
            last_valid: genesis.time,
            genesis,
            events: BTreeMap::new(),
            cache: BTreeMap::new(),
            delivered: BTreeMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
            buffered: VecDeque::new(),
        };
        engine.reset_cache();
        engine
    }

    /// Rebuild an engine around `stepper` from a decoded bundle.
    ///
    /// # Errors
    ///
    /// Fails if the bundle names another stepper, its dimensions disagree
    /// with its options, or either snapshot fails hash verification.
    pub fn from_bundle(stepper: S, bundle: EngineBundle<S::State>) -> Result<Self, EngineError> {
        if bundle.stepper != stepper.name() {
            return Err(tumble_core::CoreError::InvalidOption {
                name: "stepperName",
                details: format!(
                    "bundle was written by '{}' but the engine runs '{}'",
                    bundle.stepper,
                    stepper.name()
                ),
            }
            .into());
        }
        let options = stepper.options();
        if bundle.width != options.width || bundle.height != options.height {
            return Err(tumble_core::CoreError::InvalidOption {
                name: "width",
                details: format!(
                    "bundle is {}x{} but its options describe {}x{}",
                    bundle.width, bundle.height, options.width, options.height
                ),
            }
            .into());
        }
        let config = EngineConfig {
            cache_size: bundle.cache_size,
            ..EngineConfig::default()
        };
        let mut engine = Self::with_genesis(stepper, config, verified(bundle.genesis)?);
        engine.import_events(bundle.events)?;
        engine.time = bundle.time.max(engine.genesis.time);
        if let Some(checkpoint) = bundle.checkpoint {
            engine.import_cache(CacheBundle { snapshot: checkpoint })?;
        }
        Ok(engine)
    }

    // -- accessors ----------------------------------------------------------

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// The tick the engine presents as "now".
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Newest tick whose cached state is known to be correct.
    pub fn last_valid(&self) -> u64 {
        self.last_valid
    }

    pub fn genesis(&self) -> &Snapshot<S::State> {
        &self.genesis
    }

    pub fn width(&self) -> usize {
        self.stepper.options().width
    }

    pub fn height(&self) -> usize {
        self.stepper.options().height
    }

    /// Ticks currently held in the cache, oldest first.
    pub fn cached_ticks(&self) -> impl Iterator<Item = u64> + '_ {
        self.cache.keys().copied()
    }

    /// Events addressed to `tick`, in canonical order.
    pub fn events_at(&self, tick: u64) -> &[Event] {
        self.events.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every logged event, by tick then canonical order.
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.values().flatten()
    }

    // -- input --------------------------------------------------------------

    /// Log an event and invalidate every cached state it affects.
    ///
    /// # Errors
    ///
    /// [`EngineError::StaleEvent`] if the event is at or before genesis, or
    /// the stepper's validation error for malformed payloads.
    pub fn add_event(&mut self, event: Event) -> Result<(), EngineError> {
        self.stepper.validate_event(&event)?;
        if event.time <= self.genesis.time {
            return Err(EngineError::StaleEvent {
                time: event.time,
                genesis: self.genesis.time,
            });
        }
        let time = event.time;
        self.insert_event(event);
        self.invalidate_from(time);
        Ok(())
    }

    fn insert_event(&mut self, event: Event) {
        let bucket = self.events.entry(event.time).or_default();
        let key = event.sort_key();
        let at = bucket.partition_point(|e| e.sort_key() <= key);
        bucket.insert(at, event);
    }

    /// Lower the valid pointer so that tick `time` gets re-derived.
    fn invalidate_from(&mut self, time: u64) {
        let previous = time - 1;
        if previous >= self.last_valid {
            return;
        }
        if self.cache.contains_key(&previous) {
            tracing::debug!(from = self.last_valid, to = previous, "rolled back valid tick");
            self.last_valid = previous;
        } else {
            tracing::debug!(
                tick = time,
                oldest = ?self.cache.keys().next(),
                "event predates the cache window; replaying from genesis"
            );
            self.reset_cache();
        }
    }

    /// Drop every cached state and restart from the genesis snapshot.
    fn reset_cache(&mut self) {
        let mut state = self.genesis.state.clone();
        self.stepper.restore(&mut state);
        self.cache.clear();
        self.cache.insert(self.genesis.time, state);
        self.last_valid = self.genesis.time;
    }

    // -- stepping -----------------------------------------------------------

    /// Advance "now" by one tick and return the state there.
    pub fn step(&mut self) -> Result<&S::State, EngineError> {
        self.time += 1;
        tracing::trace!(time = self.time, "step");
        self.derive(self.time)
    }

    /// Move "now" to `time`. Later ticks stay in the cache.
    pub fn set_time(&mut self, time: u64) -> Result<(), EngineError> {
        if time < self.genesis.time {
            return Err(EngineError::BeforeGenesis {
                time,
                genesis: self.genesis.time,
            });
        }
        self.time = time;
        Ok(())
    }

    /// The state at "now", re-deriving stale ticks first.
    pub fn current_state(&mut self) -> Result<&S::State, EngineError> {
        self.derive(self.time)
    }

    /// The state at any tick from genesis on.
    pub fn state_at(&mut self, tick: u64) -> Result<&S::State, EngineError> {
        if tick < self.genesis.time {
            return Err(EngineError::BeforeGenesis {
                time: tick,
                genesis: self.genesis.time,
            });
        }
        self.derive(tick)
    }

    /// Hashed snapshot of the state at `tick`.
    pub fn snapshot_at(&mut self, tick: u64) -> Result<Snapshot<S::State>, EngineError> {
        let state = self.state_at(tick)?.clone();
        Ok(Snapshot::capture(tick, state))
    }

    /// BLAKE3 hash of the current state, as recorded in snapshots.
    pub fn state_hash(&mut self) -> Result<String, EngineError> {
        let time = self.time;
        Ok(self.snapshot_at(time)?.hash)
    }

    fn derive(&mut self, target: u64) -> Result<&S::State, EngineError> {
        if target <= self.last_valid && !self.cache.contains_key(&target) {
            tracing::debug!(target, "requested tick left the cache; replaying from genesis");
            self.reset_cache();
        }
        if target > self.last_valid {
            let from = self.last_valid;
            let mut state = self
                .cache
                .get(&from)
                .cloned()
                .ok_or(EngineError::CacheMiss { tick: from })?;
            if from + 1 < target {
                tracing::debug!(from, to = target, replayed = target - from, "replaying ticks");
            }
            for tick in from + 1..=target {
                let events = self.events.get(&tick).map(Vec::as_slice).unwrap_or(&[]);
                let effects = self.stepper.step(&mut state, events);
                self.deliver(tick, effects);
                self.store(tick, state.clone());
                self.last_valid = tick;
            }
        }
        self.cache
            .get(&target)
            .ok_or(EngineError::CacheMiss { tick: target })
    }

    fn store(&mut self, tick: u64, state: S::State) {
        self.cache.insert(tick, state);
        let window = self.config.cache_size as u64;
        while let Some((&oldest, _)) = self.cache.first_key_value() {
            if oldest + window > tick {
                break;
            }
            self.cache.pop_first();
        }
        // Short of a replay from genesis, only ticks after the oldest cached
        // state are ever replayed.
        if let Some(&oldest) = self.cache.keys().next() {
            while let Some(entry) = self.delivered.first_entry() {
                if *entry.key() > oldest {
                    break;
                }
                entry.remove();
            }
        }
    }

    // -- effects ------------------------------------------------------------

    /// Subscribe to effects of `effect_type` (the serde tag, e.g. `"chainDone"`).
    ///
    /// A filtered listener is called at most once per tick, replays
    /// included; the first matching effect wins. An unfiltered one sees
    /// every distinct occurrence.
    ///
    /// Delivery is remembered only for ticks still covered by the cache
    /// window. An event older than the window forces a replay from genesis,
    /// which re-delivers the effects of the ticks outside it.
    pub fn on<F>(&mut self, effect_type: &str, callback: F, filtered: bool) -> ListenerId
    where
        F: FnMut(&Effect) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(Listener {
            id,
            effect_type: effect_type.to_owned(),
            filtered,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Take the buffered first-time effects, oldest first.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        self.buffered.drain(..).collect()
    }

    fn deliver(&mut self, tick: u64, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        let delivered = self.delivered.entry(tick).or_default();
        for effect in effects {
            if !delivered.hashes.insert(effect.hash()) {
                continue;
            }
            for listener in &mut self.listeners {
                if listener.effect_type != effect.type_name() {
                    continue;
                }
                if listener.filtered && !delivered.fired.insert(listener.id) {
                    continue;
                }
                (listener.callback)(&effect);
            }
            if self.config.effect_buffer > 0 {
                if self.buffered.len() == self.config.effect_buffer {
                    self.buffered.pop_front();
                }
                self.buffered.push_back(effect);
            }
        }
    }

    // -- stepper queries ----------------------------------------------------

    /// Run a stepper predicate (`canStep`, `canAdd`, `canPlay`) against the
    /// current state.
    pub fn call_stepper(
        &mut self,
        operation: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        self.derive(self.time)?;
        let state = self
            .cache
            .get(&self.time)
            .ok_or(EngineError::CacheMiss { tick: self.time })?;
        Ok(self.stepper.call(state, operation, args)?)
    }

    // -- history ------------------------------------------------------------

    /// Replace genesis with a later checkpoint and forget the events it
    /// already accounts for.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot does not match its hash.
    pub fn rebase(&mut self, snapshot: Snapshot<S::State>) -> Result<(), EngineError> {
        let snapshot = verified(snapshot)?;
        let dropped: usize = self
            .events
            .range(..=snapshot.time)
            .map(|(_, bucket)| bucket.len())
            .sum();
        self.events = self.events.split_off(&(snapshot.time + 1));
        self.delivered = self.delivered.split_off(&(snapshot.time + 1));
        tracing::debug!(
            from = self.genesis.time,
            to = snapshot.time,
            dropped_events = dropped,
            "rebased genesis"
        );
        self.genesis = snapshot;
        self.time = self.time.max(self.genesis.time);
        self.reset_cache();
        Ok(())
    }

    /// Genesis plus the full event log.
    pub fn export_state(&self) -> StateBundle<S::State> {
        StateBundle {
            genesis: self.genesis.clone(),
            events: self.events().cloned().collect(),
            time: self.time,
        }
    }

    /// Replace genesis and the event log with a bundle's.
    pub fn import_state(&mut self, bundle: StateBundle<S::State>) -> Result<(), EngineError> {
        let genesis = verified(bundle.genesis)?;
        let previous = std::mem::replace(&mut self.genesis, genesis);
        let events = std::mem::take(&mut self.events);
        if let Err(err) = self.import_events(bundle.events) {
            self.genesis = previous;
            self.events = events;
            return Err(err);
        }
        self.delivered.clear();
        self.time = bundle.time.max(self.genesis.time);
        self.reset_cache();
        Ok(())
    }

    fn import_events(&mut self, events: Vec<Event>) -> Result<(), EngineError> {
        for event in &events {
            self.stepper.validate_event(event)?;
            if event.time <= self.genesis.time {
                return Err(EngineError::StaleEvent {
                    time: event.time,
                    genesis: self.genesis.time,
                });
            }
        }
        for event in events {
            self.insert_event(event);
        }
        Ok(())
    }

    /// Hashed snapshot of the current state.
    pub fn export_cache(&mut self) -> Result<CacheBundle<S::State>, EngineError> {
        let time = self.time;
        Ok(CacheBundle {
            snapshot: self.snapshot_at(time)?,
        })
    }

    /// Seed the cache with a checkpoint so that ticks up to it need no
    /// replay. Cached ticks after the checkpoint, and stale ticks after the
    /// valid pointer, are discarded.
    pub fn import_cache(&mut self, bundle: CacheBundle<S::State>) -> Result<(), EngineError> {
        let snapshot = verified(bundle.snapshot)?;
        if snapshot.time < self.genesis.time {
            return Err(EngineError::BeforeGenesis {
                time: snapshot.time,
                genesis: self.genesis.time,
            });
        }
        let mut state = snapshot.state;
        self.stepper.restore(&mut state);
        let valid = self.last_valid;
        self.cache.retain(|&tick, _| tick <= valid && tick < snapshot.time);
        self.store(snapshot.time, state);
        self.last_valid = snapshot.time;
        self.time = self.time.max(snapshot.time);
        tracing::debug!(tick = snapshot.time, "imported cache checkpoint");
        Ok(())
    }

    /// Everything needed to resume this engine elsewhere: stepper name,
    /// options, genesis, events and the newest valid cached state.
    pub fn to_bundle(&self) -> Result<EngineBundle<S::State>, EngineError> {
        let state = self
            .cache
            .get(&self.last_valid)
            .ok_or(EngineError::CacheMiss {
                tick: self.last_valid,
            })?;
        let checkpoint = (self.last_valid > self.genesis.time)
            .then(|| Snapshot::capture(self.last_valid, state.clone()));
        Ok(EngineBundle {
            stepper: self.stepper.name().to_owned(),
            options: self.stepper.options().clone(),
            width: self.width(),
            height: self.height(),
            cache_size: self.config.cache_size,
            genesis: self.genesis.clone(),
            events: self.events().cloned().collect(),
            time: self.time,
            checkpoint,
        })
    }

    /// JSON form of [`Engine::to_bundle`].
    pub fn serialize(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(&self.to_bundle()?)?)
    }

    /// Record the log of this engine's history from genesis to "now", with
    /// a state-hash checkpoint every `checkpoint_interval` ticks.
    pub fn record_replay(
        &mut self,
        checkpoint_interval: u64,
    ) -> Result<ReplayLog<S::State>, EngineError> {
        let mut recorder =
            ReplayRecorder::new(self.stepper.name(), self.genesis.clone(), checkpoint_interval);
        for tick in self.genesis.time + 1..=self.time {
            let events = self.events_at(tick).to_vec();
            let hash = if recorder.wants_checkpoint(tick) {
                Some(self.snapshot_at(tick)?.hash)
            } else {
                None
            };
            recorder.record_tick(tick, &events, hash);
        }
        Ok(recorder.finish())
    }
}

/// Check a snapshot against its recorded hash.
pub(crate) fn verified<T: serde::Serialize>(
    snapshot: Snapshot<T>,
) -> Result<Snapshot<T>, EngineError> {
    let actual = snapshot.recompute_hash();
    if actual != snapshot.hash {
        tracing::warn!(
            time = snapshot.time,
            expected = %snapshot.hash,
            actual = %actual,
            "snapshot hash mismatch"
        );
        return Err(EngineError::SnapshotHashMismatch {
            time: snapshot.time,
            expected: snapshot.hash,
            actual,
        });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tumble_core::event::EventKind;
    use tumble_panel::prelude::*;

    fn engine(cache_size: usize) -> Engine<PanelStepper> {
        let stepper = PanelStepper::new(GameOptions {
            seed: Some([9, 8, 7, 6, 0]),
            ..Default::default()
        })
        .unwrap();
        Engine::new(
            stepper,
            EngineConfig {
                cache_size,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn genesis_is_cached_at_tick_zero() {
        let engine = engine(8);
        assert_eq!(engine.time(), 0);
        assert_eq!(engine.last_valid(), 0);
        assert_eq!(engine.cached_ticks().collect::<Vec<_>>(), vec![0]);
        assert!(engine.genesis().is_intact());
    }

    #[test]
    fn step_caches_each_tick() {
        let mut engine = engine(8);
        for _ in 0..3 {
            engine.step().unwrap();
        }
        assert_eq!(engine.cached_ticks().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(engine.current_state().unwrap().time, 3);
    }

    #[test]
    fn cache_is_a_bounded_window() {
        let mut engine = engine(4);
        for _ in 0..10 {
            engine.step().unwrap();
        }
        assert_eq!(engine.cached_ticks().collect::<Vec<_>>(), vec![7, 8, 9, 10]);
    }

    #[test]
    fn stale_events_are_rejected() {
        let mut engine = engine(8);
        let err = engine.add_event(Event::new(0, EventKind::AddRow)).unwrap_err();
        assert!(matches!(err, EngineError::StaleEvent { time: 0, genesis: 0 }));
    }

    #[test]
    fn late_event_lowers_the_valid_pointer() {
        let mut engine = engine(8);
        for _ in 0..6 {
            engine.step().unwrap();
        }
        engine.add_event(Event::new(4, EventKind::AddRow)).unwrap();
        assert_eq!(engine.last_valid(), 3);
        // Future events leave the pointer alone.
        engine.add_event(Event::new(9, EventKind::AddRow)).unwrap();
        assert_eq!(engine.last_valid(), 3);
        engine.current_state().unwrap();
        assert_eq!(engine.last_valid(), 6);
    }

    #[test]
    fn event_before_the_window_resets_to_genesis() {
        let mut engine = engine(4);
        for _ in 0..10 {
            engine.step().unwrap();
        }
        engine.add_event(Event::new(7, EventKind::AddRow)).unwrap();
        assert_eq!(engine.last_valid(), 0);
        assert_eq!(engine.cached_ticks().collect::<Vec<_>>(), vec![0]);
        assert_eq!(engine.current_state().unwrap().time, 10);
    }

    #[test]
    fn buckets_are_kept_in_canonical_order() {
        let mut a = engine(8);
        let mut b = engine(8);
        let swap = Event::new(2, EventKind::Swap { index: 61 });
        let row = Event::new(2, EventKind::AddRow);
        a.add_event(swap.clone()).unwrap();
        a.add_event(row.clone()).unwrap();
        b.add_event(row).unwrap();
        b.add_event(swap).unwrap();
        assert_eq!(a.events_at(2), b.events_at(2));
        assert_eq!(a.events_at(2)[0].kind, EventKind::AddRow);
    }

    /// `_,G,G,R,R,_ / G,R,R,B,B,B`: the bottom run matches on tick 1.
    fn matching_engine() -> Engine<PanelStepper> {
        let colors = [
            None, Some(0), Some(0), Some(1), Some(1), None,
            Some(0), Some(1), Some(1), Some(2), Some(2), Some(2),
        ];
        let stepper = PanelStepper::new(GameOptions {
            width: 6,
            height: 2,
            colors: Some(colors.to_vec()),
            seed: Some([1, 1, 1, 1, 0]),
            ..Default::default()
        })
        .unwrap();
        Engine::new(stepper, EngineConfig::default()).unwrap()
    }

    #[test]
    fn replayed_effects_are_delivered_once() {
        let mut engine = matching_engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.on("matchMade", move |e| sink.lock().unwrap().push(e.clone()), false);
        for _ in 0..5 {
            engine.step().unwrap();
        }
        let first = seen.lock().unwrap().clone();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].time, 1);

        // An event the match-grid rules ignore forces a replay of ticks 1..=5
        // that produces the very same effects.
        engine.add_event(Event::new(1, EventKind::DropPiece)).unwrap();
        assert_eq!(engine.last_valid(), 0);
        engine.current_state().unwrap();
        assert_eq!(engine.last_valid(), 5);
        assert_eq!(*seen.lock().unwrap(), first);
        assert_eq!(engine.drain_effects().len(), first.len());
    }

    #[test]
    fn filtered_listeners_fire_once_per_tick() {
        let mut engine = matching_engine();
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        engine.on("blockLanded", move |_| *sink.lock().unwrap() += 1, true);
        let all = Arc::new(Mutex::new(Vec::new()));
        let all_sink = Arc::clone(&all);
        engine.on("blockLanded", move |e| all_sink.lock().unwrap().push(e.time), false);
        for _ in 0..80 {
            engine.step().unwrap();
        }
        let times: BTreeSet<u64> = all.lock().unwrap().iter().copied().collect();
        assert_eq!(*count.lock().unwrap(), times.len());
    }

    /// Adds up `addNuisance` amounts and reports the running sum every tick.
    struct Tally {
        options: GameOptions,
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct TallyState {
        time: u64,
        total: u64,
    }

    impl Stepper for Tally {
        type State = TallyState;

        fn name(&self) -> &'static str {
            "tally"
        }

        fn options(&self) -> &GameOptions {
            &self.options
        }

        fn initialize_state(&self) -> Result<TallyState, tumble_core::CoreError> {
            Ok(TallyState { time: 0, total: 0 })
        }

        fn time(&self, state: &TallyState) -> u64 {
            state.time
        }

        fn validate_event(&self, _event: &Event) -> Result<(), tumble_core::CoreError> {
            Ok(())
        }

        fn step(&self, state: &mut TallyState, events: &[Event]) -> Vec<Effect> {
            state.time += 1;
            let amount: u64 = events
                .iter()
                .map(|e| match e.kind {
                    EventKind::AddNuisance { amount } => u64::from(amount),
                    _ => 0,
                })
                .sum();
            state.total += amount;
            vec![Effect::new(
                state.time,
                tumble_core::effect::EffectKind::Score {
                    amount,
                    total: state.total,
                },
            )]
        }

        fn call(
            &self,
            _state: &TallyState,
            operation: &str,
            _args: &serde_json::Value,
        ) -> Result<serde_json::Value, tumble_core::CoreError> {
            Err(tumble_core::stepper::unknown_operation("tally", operation))
        }
    }

    fn tally(cache_size: usize) -> Engine<Tally> {
        let stepper = Tally {
            options: GameOptions::default(),
        };
        let config = EngineConfig {
            cache_size,
            ..Default::default()
        };
        Engine::new(stepper, config).unwrap()
    }

    #[test]
    fn filtered_listeners_stay_quiet_when_a_replay_changes_the_effect() {
        let mut engine = tally(16);
        let filtered = Arc::new(Mutex::new(Vec::new()));
        let filtered_sink = Arc::clone(&filtered);
        engine.on("score", move |e| filtered_sink.lock().unwrap().push(e.time), true);
        let all = Arc::new(Mutex::new(Vec::new()));
        let all_sink = Arc::clone(&all);
        engine.on("score", move |e| all_sink.lock().unwrap().push(e.time), false);

        engine.add_event(Event::new(3, EventKind::AddNuisance { amount: 1 })).unwrap();
        for _ in 0..5 {
            engine.step().unwrap();
        }
        assert_eq!(*filtered.lock().unwrap(), vec![1, 2, 3, 4, 5]);

        // Tick 3 now reports a different score; ticks 4 and 5 do too.
        engine.add_event(Event::new(3, EventKind::AddNuisance { amount: 2 })).unwrap();
        engine.current_state().unwrap();
        assert_eq!(*filtered.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(*all.lock().unwrap(), vec![1, 2, 3, 4, 5, 3, 4, 5]);
    }

    #[test]
    fn delivery_records_follow_the_cache_window() {
        let mut engine = tally(4);
        for _ in 0..50 {
            engine.step().unwrap();
        }
        assert_eq!(engine.cached_ticks().collect::<Vec<_>>(), vec![47, 48, 49, 50]);
        assert_eq!(engine.delivered.keys().copied().collect::<Vec<_>>(), vec![48, 49, 50]);

        // A rollback inside the window still suppresses repeats.
        engine.drain_effects();
        engine.add_event(Event::new(49, EventKind::AddRow)).unwrap();
        engine.current_state().unwrap();
        assert!(engine.drain_effects().is_empty());
        assert!(engine.delivered.len() < 4);
    }

    #[test]
    fn off_removes_a_listener() {
        let mut engine = engine(8);
        let id = engine.on("score", |_| {}, true);
        assert!(engine.off(id));
        assert!(!engine.off(id));
    }

    #[test]
    fn set_time_rejects_ticks_before_genesis() {
        let mut engine = engine(8);
        for _ in 0..5 {
            engine.step().unwrap();
        }
        let snapshot = engine.snapshot_at(3).unwrap();
        engine.rebase(snapshot).unwrap();
        assert_eq!(engine.time(), 5);
        assert!(matches!(
            engine.set_time(2),
            Err(EngineError::BeforeGenesis { time: 2, genesis: 3 })
        ));
    }

    #[test]
    fn tampered_snapshots_are_refused() {
        let mut engine = engine(8);
        engine.step().unwrap();
        let mut snapshot = engine.snapshot_at(1).unwrap();
        snapshot.state.score = 12345;
        assert!(matches!(
            engine.rebase(snapshot),
            Err(EngineError::SnapshotHashMismatch { time: 1, .. })
        ));
    }
}
