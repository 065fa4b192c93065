//! Hit-testing and dwell accumulation.
//!
//! Every active window is tested on each call and every window containing the gaze
//! pixel counts a hit, so overlapping windows accumulate together. Counts only grow
//! until [`GazeProcessor::reset_dwell`] is called at the trial boundary.

use gazex_core::{ObjectId, ObjectKind, TargetWindow, Vec2, is_invalid_pixel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::CalibrationParameters;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// Accumulated dwell since the last reset.
    pub count: u32,
    /// Whether this call's pixel landed in the window.
    pub hit: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeReport {
    pub activations: Vec<Activation>,
    /// Centre of every window hit on this call, for the overlay.
    pub hit_points: Vec<Vec2>,
}

impl GazeReport {
    pub fn any_hit(&self) -> bool {
        self.activations.iter().any(|a| a.hit)
    }
}

#[derive(Debug, Clone)]
struct ActiveWindow {
    window: TargetWindow,
    count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct GazeProcessor {
    windows: Vec<ActiveWindow>,
    pixels_per_degree: Option<f32>,
    gaze_radius_deg: Option<f32>,
}

impl GazeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks up the scale needed to express the gaze tolerance in pixels.
    pub fn update_calibration(&mut self, params: &CalibrationParameters) {
        self.pixels_per_degree = Some(params.pixels_per_degree);
    }

    /// Minimum window radius in degrees of visual angle.
    pub fn set_gaze_window(&mut self, radius_deg: f32) {
        self.gaze_radius_deg = Some(radius_deg);
    }

    /// Radius used for `window` on the next call.
    pub fn effective_radius(&self, window: &TargetWindow) -> f32 {
        let r = window.radius();
        match (self.gaze_radius_deg, self.pixels_per_degree) {
            (Some(deg), Some(ppd)) => r.max(deg * ppd),
            _ => r,
        }
    }

    /// Adds a window with zero dwell. Re-adding an active id moves the window and keeps
    /// its count.
    pub fn add_window(&mut self, window: TargetWindow) {
        match self.windows.iter_mut().find(|w| w.window.id == window.id) {
            Some(active) => active.window = window,
            None => self.windows.push(ActiveWindow { window, count: 0 }),
        }
    }

    /// Drops the window and its dwell count.
    pub fn remove_window(&mut self, id: ObjectId) -> bool {
        let before = self.windows.len();
        self.windows.retain(|w| w.window.id != id);
        before != self.windows.len()
    }

    pub fn remove_kind(&mut self, kind: ObjectKind) {
        self.windows.retain(|w| w.window.kind != kind);
    }

    pub fn clear_windows(&mut self) {
        self.windows.clear();
    }

    pub fn reset_dwell(&mut self) {
        debug!("dwell reset on {} windows", self.windows.len());
        for w in &mut self.windows {
            w.count = 0;
        }
    }

    /// Dwell for an active window. Undefined, so `None`, once the window is removed.
    pub fn count(&self, id: ObjectId) -> Option<u32> {
        self.windows
            .iter()
            .find(|w| w.window.id == id)
            .map(|w| w.count)
    }

    /// Window of `kind` with the highest dwell, first added wins ties.
    pub fn leader(&self, kind: ObjectKind) -> Option<(ObjectId, u32)> {
        self.windows
            .iter()
            .filter(|w| w.window.kind == kind)
            .fold(None, |best: Option<(ObjectId, u32)>, w| match best {
                Some((_, c)) if c >= w.count => best,
                _ => Some((w.window.id, w.count)),
            })
    }

    pub fn windows(&self) -> impl Iterator<Item = &TargetWindow> {
        self.windows.iter().map(|w| &w.window)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn process_gaze(&mut self, pixel: Vec2) -> GazeReport {
        let valid = !is_invalid_pixel(&pixel);
        let mut report = GazeReport {
            activations: Vec::with_capacity(self.windows.len()),
            hit_points: Vec::new(),
        };
        let radii: Vec<f32> = self
            .windows
            .iter()
            .map(|w| self.effective_radius(&w.window))
            .collect();
        for (w, radius) in self.windows.iter_mut().zip(radii) {
            let hit = valid && w.window.contains(&pixel, radius);
            if hit {
                w.count += 1;
                report.hit_points.push(w.window.position);
            }
            report.activations.push(Activation {
                id: w.window.id,
                kind: w.window.kind,
                count: w.count,
                hit,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn window(id: u32, kind: ObjectKind, x: f32, y: f32, radius: f32) -> TargetWindow {
        // fraction 0.5 makes the radius half the size
        TargetWindow::new(ObjectId(id), kind, Vec2::new(x, y), radius * 2.0, 0.5)
    }

    #[test]
    fn hit_then_miss_keeps_count() {
        let mut g = GazeProcessor::new();
        g.add_window(window(1, ObjectKind::Target, 960.0, 540.0, 10.0));

        let r = g.process_gaze(Vec2::new(965.0, 540.0));
        assert!(r.activations[0].hit);
        assert_eq!(r.activations[0].count, 1);
        assert_eq!(r.hit_points, vec![Vec2::new(960.0, 540.0)]);

        let r = g.process_gaze(Vec2::new(975.0, 540.0));
        assert!(!r.activations[0].hit);
        assert_eq!(r.activations[0].count, 1);
        assert!(r.hit_points.is_empty());
    }

    #[test]
    fn overlapping_windows_both_count() {
        let mut g = GazeProcessor::new();
        g.add_window(window(1, ObjectKind::Target, 100.0, 100.0, 20.0));
        g.add_window(window(2, ObjectKind::Distractor, 120.0, 100.0, 20.0));
        let r = g.process_gaze(Vec2::new(110.0, 100.0));
        assert!(r.activations.iter().all(|a| a.hit && a.count == 1));
        assert_eq!(r.hit_points.len(), 2);
    }

    #[test]
    fn invalid_pixel_hits_nothing() {
        let mut g = GazeProcessor::new();
        // A window around the origin would contain (-1, -1) geometrically.
        g.add_window(window(1, ObjectKind::Fixation, 0.0, 0.0, 50.0));
        g.process_gaze(Vec2::new(1.0, 1.0));
        for p in [Vec2::new(-1.0, -1.0), Vec2::new(-1.0, 3.0), Vec2::new(f32::NAN, 0.0)] {
            let r = g.process_gaze(p);
            assert!(!r.any_hit());
            assert_eq!(r.activations[0].count, 1);
        }
    }

    #[test]
    fn reset_and_remove() {
        let mut g = GazeProcessor::new();
        g.add_window(window(1, ObjectKind::Target, 0.0, 0.0, 5.0));
        g.add_window(window(2, ObjectKind::Target, 100.0, 0.0, 5.0));
        g.process_gaze(Vec2::new(1.0, 1.0));
        assert_eq!(g.count(ObjectId(1)), Some(1));
        g.reset_dwell();
        assert_eq!(g.count(ObjectId(1)), Some(0));
        assert!(g.remove_window(ObjectId(1)));
        assert!(!g.remove_window(ObjectId(1)));
        assert_eq!(g.count(ObjectId(1)), None);
        g.clear_windows();
        assert!(g.is_empty());
        assert!(g.process_gaze(Vec2::new(100.0, 0.0)).activations.is_empty());
    }

    #[test]
    fn re_adding_a_window_keeps_dwell() {
        let mut g = GazeProcessor::new();
        g.add_window(window(1, ObjectKind::Cue, 0.0, 0.0, 5.0));
        g.process_gaze(Vec2::new(0.0, 0.0));
        g.add_window(window(1, ObjectKind::Cue, 50.0, 0.0, 5.0));
        assert_eq!(g.count(ObjectId(1)), Some(1));
        assert_eq!(g.windows().count(), 1);
    }

    #[test]
    fn gaze_tolerance_widens_small_windows() {
        let mut g = GazeProcessor::new();
        let w = window(1, ObjectKind::Fixation, 0.0, 0.0, 5.0);
        g.add_window(w.clone());
        g.set_gaze_window(2.0);
        assert_eq!(g.effective_radius(&w), 5.0);
        g.update_calibration(&CalibrationParameters::default());
        assert_eq!(g.effective_radius(&w), 60.0);
        assert!(g.process_gaze(Vec2::new(59.0, 0.0)).any_hit());
        let big = window(2, ObjectKind::Target, 0.0, 0.0, 100.0);
        assert_eq!(g.effective_radius(&big), 100.0);
    }

    #[test]
    fn leader_prefers_highest_then_first() {
        let mut g = GazeProcessor::new();
        g.add_window(window(1, ObjectKind::Target, 0.0, 0.0, 5.0));
        g.add_window(window(2, ObjectKind::Target, 100.0, 0.0, 5.0));
        g.add_window(window(3, ObjectKind::Distractor, 200.0, 0.0, 5.0));
        assert_eq!(g.leader(ObjectKind::Target), Some((ObjectId(1), 0)));
        g.process_gaze(Vec2::new(100.0, 0.0));
        assert_eq!(g.leader(ObjectKind::Target), Some((ObjectId(2), 1)));
        assert_eq!(g.leader(ObjectKind::Fixation), None);
    }

    #[test]
    fn dwell_never_decreases_within_a_trial() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut g = GazeProcessor::new();
        g.add_window(window(1, ObjectKind::Target, 500.0, 500.0, 80.0));
        g.add_window(window(2, ObjectKind::Distractor, 560.0, 500.0, 80.0));
        let mut last = [0u32; 2];
        for _ in 0..500 {
            let p = if rng.random_bool(0.1) {
                Vec2::new(-1.0, -1.0)
            } else {
                Vec2::new(rng.random_range(300.0..800.0), rng.random_range(300.0..700.0))
            };
            let r = g.process_gaze(p);
            for (i, a) in r.activations.iter().enumerate() {
                assert!(a.count >= last[i]);
                assert_eq!(a.count, last[i] + a.hit as u32);
                last[i] = a.count;
            }
        }
        assert!(last[0] > 0 && last[1] > 0);
    }
}
