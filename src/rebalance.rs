//! Load-balance planning.
//!
//! The scheduler thread periodically snapshots the published per-actor
//! mean batch durations, grouped by owning runner, and asks this module
//! whether moving a single actor would narrow the spread between the
//! heaviest and lightest runner. Planning is pure so the policy can be
//! tested without threads; enacting a migration is the runner's job.

use crate::actor::ActorId;

/// One actor's published load on its current runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActorLoad {
    pub(crate) actor: ActorId,
    pub(crate) mean_nanos: u64,
}

/// All actors currently owned by one runner.
#[derive(Debug, Clone)]
pub(crate) struct RunnerLoad {
    pub(crate) runner: usize,
    pub(crate) actors: Vec<ActorLoad>,
}

impl RunnerLoad {
    fn total(&self) -> u64 {
        self.actors.iter().map(|a| a.mean_nanos).sum()
    }
}

/// A planned single-actor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Migration {
    pub(crate) actor: ActorId,
    pub(crate) from: usize,
    pub(crate) to: usize,
}

/// Plans at most one migration for this pass.
///
/// Picks the heaviest and lightest runners by total load (first index on
/// ties), gates on the relative imbalance `(heavy - light) / heavy`
/// exceeding `threshold`, and requires the heavy runner to keep at least
/// one actor. The candidate is the heavy runner's actor whose load is
/// closest to half the gap (lowest actor id on ties). The move is
/// rejected when it would overshoot: if the roles would flip, or the
/// absolute gap would not shrink, rebalancing oscillates instead of
/// converging, so no move is better than that move.
pub(crate) fn plan_migration(loads: &[RunnerLoad], threshold: f64) -> Option<Migration> {
    if loads.len() < 2 {
        return None;
    }

    let (heavy_index, heavy) = loads
        .iter()
        .enumerate()
        .max_by(|(ai, a), (bi, b)| a.total().cmp(&b.total()).then(bi.cmp(ai)))?;
    let (light_index, light) = loads
        .iter()
        .enumerate()
        .min_by(|(ai, a), (bi, b)| a.total().cmp(&b.total()).then(ai.cmp(bi)))?;
    if heavy_index == light_index {
        return None;
    }

    let heavy_total = heavy.total();
    let light_total = light.total();
    if heavy_total == 0 {
        return None;
    }
    let gap = heavy_total - light_total;
    #[allow(clippy::cast_precision_loss)]
    let imbalance = gap as f64 / heavy_total as f64;
    if imbalance <= threshold {
        return None;
    }
    if heavy.actors.len() < 2 {
        return None;
    }

    // The ideal transfer halves the gap exactly.
    let ideal = gap / 2;
    let candidate = heavy
        .actors
        .iter()
        .min_by(|a, b| {
            distance(a.mean_nanos, ideal)
                .cmp(&distance(b.mean_nanos, ideal))
                .then(a.actor.cmp(&b.actor))
        })?;

    let new_heavy = heavy_total - candidate.mean_nanos;
    let new_light = light_total + candidate.mean_nanos;
    if new_light > new_heavy {
        tracing::trace!(
            actor = %candidate.actor,
            "migration rejected: roles would flip"
        );
        return None;
    }
    if new_heavy - new_light >= gap {
        tracing::trace!(
            actor = %candidate.actor,
            "migration rejected: gap would not shrink"
        );
        return None;
    }

    Some(Migration {
        actor: candidate.actor,
        from: heavy.runner,
        to: light.runner,
    })
}

fn distance(a: u64, b: u64) -> u64 {
    a.max(b) - a.min(b)
}
