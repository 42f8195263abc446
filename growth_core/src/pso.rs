//! Distributed particle swarm optimizer.
//!
//! Every unit is one particle. It publishes its last evaluated position and
//! fitness in its own context, reads its neighbors' reports, and reads and
//! writes the swarm best held in the leader unit's context. There is no lock
//! across units: the swarm best is last-write-wins, versioned and timestamped
//! so a reader can tell how old it is.

use growth_traits::{Context, ContextValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PsoCfg;
use crate::util::{FITNESS_SENTINEL, sanitize_fitness};

/// Cognitive coefficient (own best).
pub const C1: f64 = 2.1;
/// Social coefficient (neighbor best).
pub const C2: f64 = 1.1;
/// Global coefficient (swarm best).
pub const C3: f64 = 1.6;

/// Constriction-style inertia derived from the three coefficients.
pub const W: f64 = 2.0 * 0.8 / (C1 + C2 + C3 - 2.0);

/// Share of the search range used for a fresh random velocity.
const INITIAL_VELOCITY_SHARE: f64 = 0.2;

pub mod keys {
    pub const POSITION: &str = "psoPosition";
    pub const VELOCITY: &str = "psoVelocity";
    pub const BEST_POSITION: &str = "psoBestPosition";
    pub const BEST_FITNESS: &str = "psoBestFitness";
    pub const REPORTED_POSITION: &str = "psoReportedPosition";
    pub const REPORTED_FITNESS: &str = "psoReportedFitness";
    pub const REPORTED_AT: &str = "psoReportedAt";
    pub const SWARM_POSITION: &str = "swarmBestPosition";
    pub const SWARM_FITNESS: &str = "swarmBestFitness";
    pub const SWARM_PARTICLE: &str = "swarmBestParticle";
    pub const SWARM_VERSION: &str = "swarmBestVersion";
    pub const SWARM_UPDATED_AT: &str = "swarmBestUpdatedAt";
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub best_position: Vec<f64>,
    pub best_fitness: f64,
}

impl Particle {
    /// Read from a unit context; `None` when absent or of the wrong dimension.
    pub fn load(ctx: &dyn Context, dims: usize) -> Option<Self> {
        let position = ctx.get_list(keys::POSITION);
        if position.len() != dims || dims == 0 {
            return None;
        }
        let velocity = ctx.get_list(keys::VELOCITY);
        let velocity = if velocity.len() == dims { velocity } else { vec![0.0; dims] };
        let best_position = ctx.get_list(keys::BEST_POSITION);
        let best_position = if best_position.len() == dims { best_position } else { position.clone() };
        Some(Self {
            position,
            velocity,
            best_position,
            best_fitness: sanitize_fitness(ctx.get_f64(keys::BEST_FITNESS, FITNESS_SENTINEL)),
        })
    }

    pub fn store(&self, ctx: &mut dyn Context) {
        ctx.put(keys::POSITION, self.position.clone().into());
        ctx.put(keys::VELOCITY, self.velocity.clone().into());
        ctx.put(keys::BEST_POSITION, self.best_position.clone().into());
        ctx.put(keys::BEST_FITNESS, self.best_fitness.into());
    }
}

/// A unit's last evaluated position and fitness, read by its neighbors.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborReport {
    pub position: Vec<f64>,
    pub fitness: f64,
    pub at_s: u64,
}

impl NeighborReport {
    pub fn load(ctx: &dyn Context, dims: usize) -> Option<Self> {
        let position = ctx.get_list(keys::REPORTED_POSITION);
        if position.len() != dims {
            return None;
        }
        Some(Self {
            position,
            fitness: sanitize_fitness(ctx.get_f64(keys::REPORTED_FITNESS, FITNESS_SENTINEL)),
            at_s: ctx.get_i64(keys::REPORTED_AT, 0).max(0) as u64,
        })
    }

    pub fn store(&self, ctx: &mut dyn Context) {
        ctx.put(keys::REPORTED_POSITION, self.position.clone().into());
        ctx.put(keys::REPORTED_FITNESS, self.fitness.into());
        ctx.put(keys::REPORTED_AT, self.at_s.into());
    }
}

/// Best-known result of the whole swarm, held by the leader.
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmBest {
    pub position: Vec<f64>,
    pub fitness: f64,
    pub particle: String,
    pub version: u64,
    pub updated_at: u64,
}

impl SwarmBest {
    pub fn load(ctx: &dyn Context, dims: usize) -> Option<Self> {
        let position = ctx.get_list(keys::SWARM_POSITION);
        if position.len() != dims {
            return None;
        }
        Some(Self {
            position,
            fitness: sanitize_fitness(ctx.get_f64(keys::SWARM_FITNESS, FITNESS_SENTINEL)),
            particle: ctx.get_string(keys::SWARM_PARTICLE, ""),
            version: ctx.get_i64(keys::SWARM_VERSION, 0).max(0) as u64,
            updated_at: ctx.get_i64(keys::SWARM_UPDATED_AT, 0).max(0) as u64,
        })
    }

    pub fn store(&self, ctx: &mut dyn Context) {
        ctx.put(keys::SWARM_POSITION, self.position.clone().into());
        ctx.put(keys::SWARM_FITNESS, self.fitness.into());
        ctx.put(keys::SWARM_PARTICLE, ContextValue::Text(self.particle.clone()));
        ctx.put(keys::SWARM_VERSION, self.version.into());
        ctx.put(keys::SWARM_UPDATED_AT, self.updated_at.into());
    }

    pub fn age(&self, now_s: u64) -> u64 {
        now_s.saturating_sub(self.updated_at)
    }
}

/// Neighbor with the lowest fitness; ties keep the first.
pub fn neighbor_best(reports: &[NeighborReport]) -> Option<&NeighborReport> {
    reports.iter().fold(None, |best: Option<&NeighborReport>, r| match best {
        Some(b) if b.fitness <= r.fitness => Some(b),
        _ => Some(r),
    })
}

/// Result of one PSO update.
#[derive(Debug, Clone, PartialEq)]
pub struct PsoStep {
    /// Updated particle, positioned at the new point.
    pub particle: Particle,
    /// What this unit publishes to its neighbors.
    pub report: NeighborReport,
    /// New swarm best when this particle improved on it.
    pub swarm_best: Option<SwarmBest>,
}

pub struct PsoOptimizer {
    cfg: PsoCfg,
    rng: StdRng,
}

impl PsoOptimizer {
    pub fn new(cfg: PsoCfg, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { cfg, rng }
    }

    pub fn cfg(&self) -> &PsoCfg {
        &self.cfg
    }

    /// Fresh particle at the configured initial point (or the range center)
    /// with a random velocity.
    pub fn spawn(&mut self) -> Particle {
        let position = match &self.cfg.initial {
            Some(p) if p.len() == self.cfg.dims() => self.clamp_position(p.clone()),
            _ => self
                .cfg
                .search_min
                .iter()
                .zip(&self.cfg.search_max)
                .map(|(lo, hi)| (lo + hi) / 2.0)
                .collect(),
        };
        let velocity = self.random_velocity();
        Particle {
            best_position: position.clone(),
            position,
            velocity,
            best_fitness: FITNESS_SENTINEL,
        }
    }

    fn random_velocity(&mut self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.cfg.dims());
        for (lo, hi) in self.cfg.search_min.iter().zip(&self.cfg.search_max) {
            let amp = INITIAL_VELOCITY_SHARE * (hi - lo);
            v.push(if amp > 0.0 { self.rng.gen_range(-amp..=amp) } else { 0.0 });
        }
        v
    }

    fn clamp_position(&self, mut x: Vec<f64>) -> Vec<f64> {
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = xi.clamp(self.cfg.search_min[i], self.cfg.search_max[i]);
        }
        x
    }

    /// Update the particle with fitness `f` measured at its current position.
    ///
    /// Each attraction term is only active when `f` is worse than the
    /// corresponding reference. A missing neighbor or swarm best falls back
    /// to the particle's own position, which makes the term vanish.
    pub fn step(
        &mut self,
        particle: &Particle,
        fitness: f64,
        neighbor: Option<&NeighborReport>,
        swarm: Option<&SwarmBest>,
        unit: &str,
        now_s: u64,
    ) -> PsoStep {
        let f = sanitize_fitness(fitness);
        let x = &particle.position;
        let dims = x.len();
        let w = W;

        let (nbest, fn_) = match neighbor {
            Some(n) => (n.position.as_slice(), n.fitness),
            None => (x.as_slice(), f),
        };
        let (gbest, fg) = match swarm {
            Some(g) => (g.position.as_slice(), g.fitness),
            None => (x.as_slice(), f),
        };

        let mut velocity = Vec::with_capacity(dims);
        for i in 0..dims {
            let (r1, r2, r3): (f64, f64, f64) = (self.rng.r#gen(), self.rng.r#gen(), self.rng.r#gen());
            let mut vi = w * particle.velocity.get(i).copied().unwrap_or(0.0);
            if f > particle.best_fitness {
                vi += C1 * r1 * (particle.best_position[i] - x[i]);
            }
            if f > fn_ {
                vi += C2 * r2 * (nbest[i] - x[i]);
            }
            if f > fg {
                vi += C3 * r3 * (gbest[i] - x[i]);
            }
            let cap = self.cfg.max_step.get(i).map_or(f64::INFINITY, |m| m.abs());
            velocity.push(vi.clamp(-cap, cap));
        }
        let position = self.clamp_position(x.iter().zip(&velocity).map(|(a, b)| a + b).collect());

        let (best_position, best_fitness) = if f <= particle.best_fitness {
            (x.clone(), f)
        } else {
            (particle.best_position.clone(), particle.best_fitness)
        };

        let swarm_best = match swarm {
            Some(g) if f > g.fitness => None,
            prev => Some(SwarmBest {
                position: x.clone(),
                fitness: f,
                particle: unit.to_string(),
                version: prev.map_or(1, |g| g.version + 1),
                updated_at: now_s,
            }),
        };

        tracing::info!(
            unit,
            fitness = f,
            ?position,
            swarm_improved = swarm_best.is_some(),
            "pso step"
        );

        PsoStep {
            particle: Particle {
                position,
                velocity,
                best_position,
                best_fitness,
            },
            report: NeighborReport {
                position: x.clone(),
                fitness: f,
                at_s: now_s,
            },
            swarm_best,
        }
    }
}
