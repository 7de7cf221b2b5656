//! Progressive release of particles from the source

use std::ops::Range;

/// Per-step release plan
///
/// Particles are released in index order: step `s` activates the contiguous
/// slice `range(s)`. Counts differ by at most one, with the remainder going
/// to the earliest steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionSchedule {
    /// `offsets[s]..offsets[s + 1]` is released at step `s`
    offsets: Vec<usize>,
}

impl EmissionSchedule {
    /// Plan the release of `n_particles`
    ///
    /// With a positive `duration_h` the release spreads over
    /// `min(floor(duration_h / dt), n_steps)` steps (at least one); otherwise
    /// every particle is released at step 0.
    pub fn new(n_particles: usize, n_steps: usize, dt: f64, duration_h: Option<f64>) -> Self {
        let emission_steps = match duration_h {
            Some(d) if d > 0.0 => ((d / dt).floor() as usize).min(n_steps).max(1),
            _ => 1,
        };

        let base = n_particles / emission_steps;
        let remainder = n_particles % emission_steps;
        let mut offsets = Vec::with_capacity(emission_steps + 1);
        let mut released = 0;
        offsets.push(0);
        for step in 0..emission_steps {
            released += base + usize::from(step < remainder);
            offsets.push(released);
        }
        Self { offsets }
    }

    /// Number of steps that release particles
    pub fn emission_steps(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total particles released over the whole schedule
    pub fn total(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Particle indices released at `step` (empty after the emission window)
    pub fn range(&self, step: usize) -> Range<usize> {
        if step < self.emission_steps() {
            self.offsets[step]..self.offsets[step + 1]
        } else {
            self.total()..self.total()
        }
    }

    /// Particles released at `step`
    pub fn count(&self, step: usize) -> usize {
        self.range(step).len()
    }

    /// Particles released up to and including `step`
    pub fn released_by(&self, step: usize) -> usize {
        self.range(step).end
    }
}
