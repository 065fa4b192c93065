use rand::Rng;

/// Luminance for the photodiode marker square. A random grey level is held for a
/// random 50..100 frames so the sensor can settle before the next change.
#[derive(Debug, Clone)]
pub struct PhotoDiode<R: Rng> {
    rng: R,
    level: f32,
    hold: u32,
    held: Option<u32>,
}

impl<R: Rng> PhotoDiode<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            level: 0.0,
            hold: 0,
            held: None,
        }
    }

    /// Level for the next frame, in [0, 1).
    pub fn next(&mut self) -> f32 {
        match self.held {
            None => {
                self.hold = self.rng.random_range(50..100);
                self.level = self.rng.random_range(0.0..1.0);
                self.held = Some(0);
            }
            Some(n) if n >= self.hold => self.held = None,
            Some(n) => self.held = Some(n + 1),
        }
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn levels_are_held_for_at_least_fifty_frames() {
        let mut pd = PhotoDiode::new(StdRng::seed_from_u64(5));
        let levels: Vec<f32> = (0..2000).map(|_| pd.next()).collect();
        assert!(levels.iter().all(|l| (0.0..1.0).contains(l)));

        let mut runs = Vec::new();
        let mut run = 1;
        for w in levels.windows(2) {
            if w[0] == w[1] {
                run += 1;
            } else {
                runs.push(run);
                run = 1;
            }
        }
        assert!(runs.len() > 10);
        // the run still open at the end is not counted
        assert!(runs.iter().all(|&r| (52..=101).contains(&r)), "{runs:?}");
    }
}
