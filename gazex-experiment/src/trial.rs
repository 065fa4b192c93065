use gazex_cache::ObjectRegistry;
use gazex_core::{
    Condition, ObjectKind, Pose, TargetWindow, TrialObject, TrialParameters, Vec2,
};
use gazex_eye::Resolution;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::config::TaskConfig;

/// Builds the trial list for a session from a validated [`TaskConfig`].
pub struct TrialGenerator<'a> {
    config: &'a TaskConfig,
    display: Resolution,
}

impl<'a> TrialGenerator<'a> {
    pub fn new(config: &'a TaskConfig, display: Resolution) -> Self {
        Self { config, display }
    }

    /// Interns every configured object in a fixed order, so a registry rebuilt from the
    /// same configuration hands out the same ids.
    pub fn register(&self, registry: &mut ObjectRegistry) {
        let c = self.config;
        for name in c
            .fixation_objects
            .iter()
            .chain(&c.cue_objects)
            .chain(&c.target_objects)
            .chain(&c.distractor_objects)
        {
            registry.intern(name);
        }
    }

    /// `number_of_sets` shuffled copies of the condition table, numbered from 1.
    pub fn generate<R: Rng>(&self, registry: &mut ObjectRegistry, rng: &mut R) -> Vec<TrialParameters> {
        self.register(registry);

        let mut order: Vec<usize> = (0..self.config.number_of_sets)
            .flat_map(|_| 0..self.config.conditions.len())
            .collect();
        order.shuffle(rng);

        let trials: Vec<_> = order
            .into_iter()
            .enumerate()
            .map(|(i, cond)| self.trial(i as u32 + 1, &self.config.conditions[cond], registry, rng))
            .collect();
        info!(
            "generated {} trials from {} conditions x {} sets",
            trials.len(),
            self.config.conditions.len(),
            self.config.number_of_sets
        );
        trials
    }

    fn trial<R: Rng>(
        &self,
        trial_number: u32,
        condition: &Condition,
        registry: &mut ObjectRegistry,
        rng: &mut R,
    ) -> TrialParameters {
        let c = self.config;
        let start_pose = if c.start_positions.is_empty() {
            Pose::default()
        } else {
            c.start_positions[rng.random_range(0..c.start_positions.len())]
        };

        let res = self.display.as_vec();
        let fixations = c
            .fixation_objects
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let [ox, oy] = c.screen_fixation_offsets.get(i).copied().unwrap_or([0.5, 0.5]);
                TargetWindow::new(
                    registry.intern(name),
                    ObjectKind::Fixation,
                    Vec2::new(ox * res.x, oy * res.y),
                    c.fixation_object_size,
                    c.fixation_window,
                )
            })
            .collect();

        let cues = c
            .cue_objects
            .iter()
            .map(|name| TrialObject {
                id: registry.intern(name),
                material: Some(condition.cue.clone()),
                window: None,
            })
            .collect();

        let mut positions = c.possible_positions.clone();
        positions.shuffle(rng);
        let mut positions = positions.into_iter().map(|[x, y]| Vec2::new(x, y));

        let mut place = |names: &[String], count: usize, materials: &[String], kind: ObjectKind| {
            names
                .iter()
                .take(count)
                .enumerate()
                .map(|(i, name)| {
                    let id = registry.intern(name);
                    TrialObject {
                        id,
                        material: (!materials.is_empty()).then(|| materials[i % materials.len()].clone()),
                        window: positions
                            .next()
                            .map(|p| TargetWindow::new(id, kind, p, c.object_size, c.object_window)),
                    }
                })
                .collect::<Vec<_>>()
        };
        let targets = place(&c.target_objects, c.n_targets, &condition.targets, ObjectKind::Target);
        let distractors = place(
            &c.distractor_objects,
            c.n_distractors,
            &condition.distractors,
            ObjectKind::Distractor,
        );

        TrialParameters {
            trial_number,
            start_pose,
            condition: condition.clone(),
            fixations,
            cues,
            targets,
            distractors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn generate(config: &TaskConfig, seed: u64) -> (Vec<TrialParameters>, ObjectRegistry) {
        let mut reg = ObjectRegistry::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let trials = TrialGenerator::new(config, Resolution::new(1920, 1080)).generate(&mut reg, &mut rng);
        (trials, reg)
    }

    #[test]
    fn every_condition_appears_once_per_set() {
        let config = TaskConfig {
            number_of_sets: 3,
            ..Default::default()
        };
        let (trials, _) = generate(&config, 1);
        assert_eq!(trials.len(), 6);
        let red = trials.iter().filter(|t| t.condition.cue == "red").count();
        assert_eq!(red, 3);
        let numbers: Vec<u32> = trials.iter().map(|t| t.trial_number).collect();
        assert_eq!(numbers, (1..=6).collect::<Vec<_>>());
    }

    #[test]
    fn objects_get_distinct_positions_and_materials() {
        let mut config = TaskConfig {
            n_targets: 2,
            n_distractors: 2,
            ..Default::default()
        };
        config.validate().unwrap();
        let (trials, reg) = generate(&config, 2);
        for t in &trials {
            assert_eq!(t.targets.len(), 2);
            assert_eq!(t.distractors.len(), 2);
            let spots: HashSet<(i32, i32)> = t
                .targets
                .iter()
                .chain(&t.distractors)
                .map(|o| {
                    let p = o.window.as_ref().unwrap().position;
                    (p.x as i32, p.y as i32)
                })
                .collect();
            assert_eq!(spots.len(), 4);
            assert_eq!(t.targets[0].material.as_deref(), Some(t.condition.cue.as_str()));
            assert_eq!(t.cues[0].material.as_deref(), Some(t.condition.cue.as_str()));
            assert!(t.cues[0].window.is_none());
            assert_eq!(reg.name_of(t.targets[1].id), Some("Target1"));
        }
    }

    #[test]
    fn fixation_sits_at_its_screen_offset() {
        let config = TaskConfig {
            screen_fixation_offsets: vec![[0.25, 0.75]],
            fixation_object_size: 20.0,
            fixation_window: 2.5,
            ..Default::default()
        };
        let (trials, _) = generate(&config, 3);
        let f = &trials[0].fixations[0];
        assert_eq!(f.position, Vec2::new(480.0, 810.0));
        assert_eq!(f.radius(), 50.0);
        assert_eq!(f.kind, ObjectKind::Fixation);
    }

    #[test]
    fn registry_ids_match_a_fresh_registration() {
        let config = TaskConfig::default();
        let (_, generated) = generate(&config, 4);
        let mut fresh = ObjectRegistry::new();
        TrialGenerator::new(&config, Resolution::default()).register(&mut fresh);
        let a: Vec<_> = generated.entries().map(|(id, n)| (id, n.to_string())).collect();
        let b: Vec<_> = fresh.entries().map(|(id, n)| (id, n.to_string())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn same_seed_same_trials() {
        let config = TaskConfig::default();
        assert_eq!(generate(&config, 9).0, generate(&config, 9).0);
    }
}
