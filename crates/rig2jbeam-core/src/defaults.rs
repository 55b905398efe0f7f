//! Scoped default values for beams and nodes
//!
//! `set_beam_defaults`, `set_beam_defaults_scale`, `set_node_defaults` and
//! `detacher_group` replace the top frame with a modified copy; `section`
//! pushes a copy and `end_section` pops it. Frames are plain values, so a
//! record parsed earlier never sees a later change.

use std::collections::BTreeSet;

use crate::rig::NodeFlag;
use crate::settings::ConversionSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamDefaults {
    pub spring: f64,
    pub damp: f64,
    pub deform: f64,
    pub strength: f64,
}

impl BeamDefaults {
    fn scaled(&self, scale: &BeamDefaults) -> BeamDefaults {
        BeamDefaults {
            spring: self.spring * scale.spring,
            damp: self.damp * scale.damp,
            deform: self.deform * scale.deform,
            strength: self.strength * scale.strength,
        }
    }

    const UNIT: BeamDefaults = BeamDefaults {
        spring: 1.0,
        damp: 1.0,
        deform: 1.0,
        strength: 1.0,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefaults {
    pub load_weight: f64,
    pub friction: f64,
    pub volume: f64,
    pub surface: f64,
    pub flags: BTreeSet<NodeFlag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsFrame {
    pub beam: BeamDefaults,
    pub scale: BeamDefaults,
    pub node: NodeDefaults,
    pub detacher_group: u32,
}

impl DefaultsFrame {
    pub fn from_settings(settings: &ConversionSettings) -> Self {
        Self {
            beam: BeamDefaults {
                spring: settings.default_beam_spring,
                damp: settings.default_beam_damp,
                deform: settings.default_beam_deform,
                strength: settings.default_beam_strength,
            },
            scale: BeamDefaults::UNIT,
            node: NodeDefaults {
                load_weight: settings.default_load_weight,
                friction: settings.default_friction,
                volume: 1.0,
                surface: 1.0,
                flags: BTreeSet::new(),
            },
            detacher_group: 0,
        }
    }

    /// Beam values with the scale factors applied
    pub fn effective_beam(&self) -> BeamDefaults {
        self.beam.scaled(&self.scale)
    }
}

impl Default for DefaultsFrame {
    fn default() -> Self {
        Self::from_settings(&ConversionSettings::default())
    }
}

/// Never empty: the bottom frame holds the built-in values
#[derive(Debug, Clone)]
pub struct DefaultsStack {
    base: DefaultsFrame,
    frames: Vec<DefaultsFrame>,
}

impl DefaultsStack {
    pub fn new(base: DefaultsFrame) -> Self {
        Self {
            frames: vec![base.clone()],
            base,
        }
    }

    pub fn top(&self) -> &DefaultsFrame {
        // frames always holds at least the base frame
        &self.frames[self.frames.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Built-in values that negative directive arguments reset to
    pub fn base(&self) -> &DefaultsFrame {
        &self.base
    }

    pub fn push(&mut self) {
        self.frames.push(self.top().clone());
    }

    /// Pop a scope; returns false if only the base frame is left
    pub fn pop(&mut self) -> bool {
        if self.frames.len() == 1 {
            return false;
        }
        self.frames.pop();
        true
    }

    /// Replace the top frame with a modified copy
    pub fn replace_top(&mut self, change: impl FnOnce(&mut DefaultsFrame, &DefaultsFrame)) {
        let mut next = self.top().clone();
        change(&mut next, &self.base);
        let last = self.frames.len() - 1;
        self.frames[last] = next;
    }

    /// `set_beam_defaults spring, damp, deform, strength`; negative resets
    pub fn set_beam_defaults(&mut self, values: &[f64]) {
        self.replace_top(|frame, base| {
            apply_values(
                [
                    (&mut frame.beam.spring, base.beam.spring),
                    (&mut frame.beam.damp, base.beam.damp),
                    (&mut frame.beam.deform, base.beam.deform),
                    (&mut frame.beam.strength, base.beam.strength),
                ],
                values,
            )
        });
    }

    pub fn set_beam_scale(&mut self, values: &[f64]) {
        self.replace_top(|frame, _| {
            apply_values(
                [
                    (&mut frame.scale.spring, 1.0),
                    (&mut frame.scale.damp, 1.0),
                    (&mut frame.scale.deform, 1.0),
                    (&mut frame.scale.strength, 1.0),
                ],
                values,
            )
        });
    }

    /// `set_node_defaults loadweight, friction, volume, surface[, options]`
    pub fn set_node_defaults(&mut self, values: &[f64], flags: BTreeSet<NodeFlag>) {
        self.replace_top(|frame, base| {
            apply_values(
                [
                    (&mut frame.node.load_weight, base.node.load_weight),
                    (&mut frame.node.friction, base.node.friction),
                    (&mut frame.node.volume, base.node.volume),
                    (&mut frame.node.surface, base.node.surface),
                ],
                values,
            );
            frame.node.flags = flags;
        });
    }

    pub fn set_detacher_group(&mut self, group: u32) {
        self.replace_top(|frame, _| frame.detacher_group = group);
    }
}

fn apply_values<const N: usize>(targets: [(&mut f64, f64); N], values: &[f64]) {
    for ((target, fallback), value) in targets.into_iter().zip(values) {
        *target = if *value < 0.0 { fallback } else { *value };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_beam_defaults_replaces_top() {
        let mut stack = DefaultsStack::new(DefaultsFrame::default());
        stack.set_beam_defaults(&[100.0, 20.0]);
        let beam = stack.top().beam;
        assert_eq!(beam.spring, 100.0);
        assert_eq!(beam.damp, 20.0);
        assert_eq!(beam.deform, 400_000.0);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_negative_resets_to_builtin() {
        let mut stack = DefaultsStack::new(DefaultsFrame::default());
        stack.set_beam_defaults(&[100.0, 20.0, 30.0, 40.0]);
        stack.set_beam_defaults(&[-1.0, 21.0]);
        assert_eq!(stack.top().beam.spring, 9_000_000.0);
        assert_eq!(stack.top().beam.damp, 21.0);
    }

    #[test]
    fn test_push_pop_scopes() {
        let mut stack = DefaultsStack::new(DefaultsFrame::default());
        stack.set_beam_defaults(&[500.0]);
        stack.push();
        stack.set_beam_defaults(&[700.0]);
        stack.set_detacher_group(3);
        assert_eq!(stack.top().beam.spring, 700.0);
        assert_eq!(stack.top().detacher_group, 3);

        assert!(stack.pop());
        assert_eq!(stack.top().beam.spring, 500.0);
        assert_eq!(stack.top().detacher_group, 0);
        assert!(!stack.pop());
    }

    #[test]
    fn test_scale_applies_to_effective_values() {
        let mut stack = DefaultsStack::new(DefaultsFrame::default());
        stack.set_beam_defaults(&[1000.0, 10.0, 100.0, 200.0]);
        stack.set_beam_scale(&[2.0, 0.5]);
        let beam = stack.top().effective_beam();
        assert_eq!(beam.spring, 2000.0);
        assert_eq!(beam.damp, 5.0);
        assert_eq!(beam.strength, 200.0);
    }

    #[test]
    fn test_settings_seed_base_frame() {
        let settings = ConversionSettings {
            default_beam_spring: 15_000_000.0,
            ..Default::default()
        };
        let mut stack = DefaultsStack::new(DefaultsFrame::from_settings(&settings));
        stack.set_beam_defaults(&[1.0]);
        stack.set_beam_defaults(&[-1.0]);
        assert_eq!(stack.top().beam.spring, 15_000_000.0);
    }
}
