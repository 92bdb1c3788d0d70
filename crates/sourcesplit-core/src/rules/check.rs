//! Declarative value rules
//!
//! Most game milestones are "this remote value changed in this particular
//! way". A [`RuleList`] holds such rules in priority order; games build one at
//! session start, once the entity addresses are known, and evaluate it every
//! tick.

use serde::{Deserialize, Serialize};

use crate::memory::{ReadMemory, Vector3f};
use crate::rules::{GameContext, RuleResult, SplitOutcome};
use crate::watcher::Watcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn of(self, v: &Vector3f) -> f32 {
        match self {
            Self::X => v.x,
            Self::Y => v.y,
            Self::Z => v.z,
        }
    }
}

/// One observed value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Int(i64),
    Float(f32),
    Position(Vector3f),
}

impl Sample {
    fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(v) => Some(v as f64),
            Self::Float(v) => Some(f64::from(v)),
            Self::Position(_) => None,
        }
    }

    fn as_position(&self) -> Option<Vector3f> {
        match *self {
            Self::Position(v) => Some(v),
            _ => None,
        }
    }
}

/// Where a rule's value comes from
#[derive(Debug, Clone)]
pub enum Probe {
    Int(Watcher<i32>),
    UInt(Watcher<u32>),
    Byte(Watcher<u8>),
    Float(Watcher<f32>),
    Position(Watcher<Vector3f>),
    /// Snapshot player position
    PlayerPosition,
    /// Snapshot view-entity index
    ViewEntity,
}

impl Probe {
    pub fn update<R: ReadMemory + ?Sized>(&mut self, reader: &R) {
        match self {
            Self::Int(w) => {
                w.update(reader);
            }
            Self::UInt(w) => {
                w.update(reader);
            }
            Self::Byte(w) => {
                w.update(reader);
            }
            Self::Float(w) => {
                w.update(reader);
            }
            Self::Position(w) => {
                w.update(reader);
            }
            Self::PlayerPosition | Self::ViewEntity => {}
        }
    }

    /// `(old, current)`, once both are real observations
    pub fn samples(&self, ctx: &GameContext<'_>) -> Option<(Sample, Sample)> {
        fn pair<T, F>(primed: bool, old: T, current: T, wrap: F) -> Option<(Sample, Sample)>
        where
            F: Fn(T) -> Sample,
        {
            primed.then(|| (wrap(old), wrap(current)))
        }

        let state = ctx.state;
        let snapshot_primed = state.update_count >= 2;
        match self {
            Self::Int(w) => pair(w.is_primed(), w.old(), w.current(), |v| {
                Sample::Int(i64::from(v))
            }),
            Self::UInt(w) => pair(w.is_primed(), w.old(), w.current(), |v| {
                Sample::Int(i64::from(v))
            }),
            Self::Byte(w) => pair(w.is_primed(), w.old(), w.current(), |v| {
                Sample::Int(i64::from(v))
            }),
            Self::Float(w) => pair(w.is_primed(), w.old(), w.current(), Sample::Float),
            Self::Position(w) => pair(w.is_primed(), w.old(), w.current(), Sample::Position),
            Self::PlayerPosition => pair(
                snapshot_primed,
                state.prev_player_position,
                state.player_position,
                Sample::Position,
            ),
            Self::ViewEntity => pair(
                snapshot_primed,
                state.prev_player_view_entity_index,
                state.player_view_entity_index,
                |v| Sample::Int(v as i64),
            ),
        }
    }
}

/// How the value must have changed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Check {
    /// Was exactly `from`, is now exactly `to`
    Transition { from: i64, to: i64 },
    /// Was above the threshold, is now at or below it
    FallsTo(f64),
    /// Grew by exactly `step` from a non-zero value
    IncreasedBy(i64),
    /// The coordinate grew from a non-zero value
    AxisIncreased(Axis),
    /// Entered the tolerance radius around `target` this tick
    Arrives { target: Vector3f, planar: bool },
    /// The masked bits went from clear to set
    BitRaised(u32),
}

impl Check {
    pub fn holds(&self, old: Sample, current: Sample, tolerance: f32) -> bool {
        let distance = |v: &Vector3f, target: &Vector3f, planar: bool| {
            if planar {
                v.distance_xy(target)
            } else {
                v.distance(target)
            }
        };

        match *self {
            Self::Transition { from, to } => {
                old.as_int() == Some(from) && current.as_int() == Some(to)
            }
            Self::FallsTo(threshold) => match (old.as_f64(), current.as_f64()) {
                (Some(o), Some(c)) => o > threshold && c <= threshold,
                _ => false,
            },
            Self::IncreasedBy(step) => match (old.as_int(), current.as_int()) {
                (Some(o), Some(c)) => o != 0 && c - o == step,
                _ => false,
            },
            Self::AxisIncreased(axis) => match (old.as_position(), current.as_position()) {
                (Some(o), Some(c)) => axis.of(&o) != 0.0 && axis.of(&c) > axis.of(&o),
                _ => false,
            },
            Self::Arrives { target, planar } => {
                match (old.as_position(), current.as_position()) {
                    (Some(o), Some(c)) => {
                        distance(&o, &target, planar) > tolerance
                            && distance(&c, &target, planar) <= tolerance
                    }
                    _ => false,
                }
            }
            Self::BitRaised(mask) => match (old.as_int(), current.as_int()) {
                (Some(o), Some(c)) => {
                    let mask = i64::from(mask);
                    o & mask == 0 && c & mask != 0
                }
                _ => false,
            },
        }
    }
}

/// A probe, the change to look for and what to report
#[derive(Debug, Clone)]
pub struct ValueRule {
    pub name: &'static str,
    pub probe: Probe,
    pub check: Check,
    pub tolerance: f32,
    pub outcome: SplitOutcome,
    pub latch: bool,
    /// Ignore the rule for this many ticks after session start
    pub min_session_ticks: i32,
}

impl ValueRule {
    pub fn new(name: &'static str, probe: Probe, check: Check, outcome: SplitOutcome) -> Self {
        Self {
            name,
            probe,
            check,
            tolerance: 0.0,
            outcome,
            latch: true,
            min_session_ticks: 0,
        }
    }

    pub fn tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn unlatched(mut self) -> Self {
        self.latch = false;
        self
    }

    pub fn after_ticks(mut self, ticks: i32) -> Self {
        self.min_session_ticks = ticks;
        self
    }

    fn evaluate(&self, ctx: &GameContext<'_>) -> bool {
        if ctx.state.tick_count() < self.min_session_ticks {
            return false;
        }
        self.probe
            .samples(ctx)
            .is_some_and(|(old, current)| self.check.holds(old, current, self.tolerance))
    }

    fn result(&self) -> RuleResult {
        RuleResult {
            outcome: self.outcome,
            latch: self.latch,
        }
    }
}

/// Rules in priority order
#[derive(Debug, Clone, Default)]
pub struct RuleList {
    rules: Vec<ValueRule>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: ValueRule) {
        self.rules.push(rule);
    }

    pub fn with(mut self, rule: ValueRule) -> Self {
        self.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Remove a rule once it has fired and must not fire again this session
    pub fn remove(&mut self, name: &str) {
        self.rules.retain(|rule| rule.name != name);
    }

    /// Refresh every probe, then report the first satisfied rule.
    ///
    /// All probes are refreshed even when an earlier rule fires, so no rule
    /// sees a stale `old` on the next tick.
    pub fn evaluate(&mut self, ctx: &GameContext<'_>) -> Option<(&'static str, RuleResult)> {
        for rule in &mut self.rules {
            rule.probe.update(ctx.reader);
        }

        self.rules
            .iter()
            .find(|rule| rule.evaluate(ctx))
            .map(|rule| (rule.name, rule.result()))
    }
}
