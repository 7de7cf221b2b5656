//! Simplified historical wind: uniform in space, piecewise in time
//!
//! Each phase carries a mean wind and a per-axis standard deviation. During
//! the first [`PHASE_BLEND_HOURS`] of every phase but the first, mean and std
//! are blended linearly with the previous phase so the plume turns smoothly
//! instead of kinking at the boundary.

use super::constants::PHASE_BLEND_HOURS;
use super::{WindField, WindSample};
use crate::config::WindPhase;
use crate::error::{PlumeError, Result};
use crate::rng::{fill_gaussian, SimRng};

/// Blended wind statistics at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseState {
    pub u: f64,
    pub v: f64,
    pub u_std: f64,
    pub v_std: f64,
}

impl PhaseState {
    fn of(phase: &WindPhase) -> Self {
        Self {
            u: phase.u,
            v: phase.v,
            u_std: phase.u_std,
            v_std: phase.v_std,
        }
    }

    fn lerp(from: &WindPhase, to: &WindPhase, alpha: f64) -> Self {
        let mix = |a: f64, b: f64| (1.0 - alpha) * a + alpha * b;
        Self {
            u: mix(from.u, to.u),
            v: mix(from.v, to.v),
            u_std: mix(from.u_std, to.u_std),
            v_std: mix(from.v_std, to.v_std),
        }
    }
}

/// Phase-table wind model
#[derive(Debug, Clone)]
pub struct PhaseWind {
    phases: Vec<WindPhase>,
}

impl PhaseWind {
    /// # Errors
    /// Returns `InvalidConfig` for an empty table
    pub fn new(phases: Vec<WindPhase>) -> Result<Self> {
        if phases.is_empty() {
            return Err(PlumeError::InvalidConfig(
                "phase wind requires at least one phase".to_string(),
            ));
        }
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[WindPhase] {
        &self.phases
    }

    /// Index of the phase active at `t_hours`, falling back to the last phase
    fn phase_index(&self, t_hours: f64) -> usize {
        self.phases
            .iter()
            .position(|p| p.contains(t_hours))
            .unwrap_or(self.phases.len() - 1)
    }

    /// Phase feeding the blend into phase `index`
    fn previous_phase(&self, index: usize) -> &WindPhase {
        let start = self.phases[index].t_start;
        self.phases
            .iter()
            .find(|p| p.t_end == start)
            .unwrap_or(&self.phases[index - 1])
    }

    /// Mean and std at `t_hours`, before noise
    pub fn state_at(&self, t_hours: f64) -> PhaseState {
        let index = self.phase_index(t_hours);
        let phase = &self.phases[index];
        let elapsed = t_hours - phase.t_start;

        if index > 0 && (0.0..PHASE_BLEND_HOURS).contains(&elapsed) {
            let alpha = elapsed / PHASE_BLEND_HOURS;
            PhaseState::lerp(self.previous_phase(index), phase, alpha)
        } else {
            PhaseState::of(phase)
        }
    }
}

impl WindField for PhaseWind {
    fn name(&self) -> &'static str {
        "phase"
    }

    fn sample(&self, lons: &[f64], _lats: &[f64], t_hours: f64, rng: &mut SimRng) -> WindSample {
        let n = lons.len();
        let state = self.state_at(t_hours);
        let mut sample = WindSample::zeros(n);
        fill_gaussian(rng, state.u, state.u_std, &mut sample.u);
        fill_gaussian(rng, state.v, state.v_std, &mut sample.v);
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::sim_rng;

    fn two_phases() -> PhaseWind {
        PhaseWind::new(vec![
            WindPhase::new(0.0, 10.0, 1.0, 1.0, 0.0, 0.0),
            WindPhase::new(10.0, 20.0, 3.0, 3.0, 0.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_blend_halfway_through_window() {
        let wind = two_phases();
        let mut rng = sim_rng(Some(0));
        let s = wind.sample(&[0.0], &[0.0], 13.0, &mut rng);
        assert_eq!(s.u[0], 2.0);
        assert_eq!(s.v[0], 2.0);
    }

    #[test]
    fn test_no_blend_after_window_or_in_first_phase() {
        let wind = two_phases();
        assert_eq!(wind.state_at(16.0).u, 3.0);
        assert_eq!(wind.state_at(2.0).u, 1.0);
        // Phase boundary itself starts the blend at alpha = 0
        assert_eq!(wind.state_at(10.0).u, 1.0);
    }

    #[test]
    fn test_time_past_table_uses_last_phase() {
        let wind = two_phases();
        assert_eq!(wind.state_at(500.0).v, 3.0);
    }

    #[test]
    fn test_std_is_blended_too() {
        let wind = PhaseWind::new(vec![
            WindPhase::new(0.0, 10.0, 0.0, 0.0, 0.2, 0.4),
            WindPhase::new(10.0, 20.0, 0.0, 0.0, 0.6, 0.0),
        ])
        .unwrap();
        let state = wind.state_at(11.5);
        assert!((state.u_std - 0.3).abs() < 1e-12);
        assert!((state.v_std - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_position_is_ignored_and_seed_reproduces() {
        let wind = PhaseWind::new(vec![WindPhase::new(0.0, 48.0, -0.04, 0.18, 0.06, 0.04)]).unwrap();
        let a = wind.sample(&[0.0, 10.0, 20.0], &[40.0, 50.0, 60.0], 5.0, &mut sim_rng(Some(9)));
        let b = wind.sample(&[-5.0, 1.0, 2.0], &[0.0, 0.0, 0.0], 5.0, &mut sim_rng(Some(9)));
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(PhaseWind::new(Vec::new()).is_err());
    }
}
