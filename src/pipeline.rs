use std::collections::VecDeque;

use crate::types::{EyeObservation, FrameInput};

/// Anything that turns a frame into an eye observation. The tracker only
/// talks to this trait, so a recorded or simulated source can stand in for
/// the pupil pipeline.
pub trait GazeEstimator {
    fn name(&self) -> String;
    fn estimate(&mut self, input: &FrameInput) -> EyeObservation;
}

/// Replays a fixed list of observations, one per frame, ignoring the pixels.
/// After the script runs out every frame is gaze-lost.
pub struct ScriptedEstimator {
    script: VecDeque<EyeObservation>,
}

impl ScriptedEstimator {
    pub fn new(script: impl IntoIterator<Item = EyeObservation>) -> Self {
        Self { script: script.into_iter().collect() }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl GazeEstimator for ScriptedEstimator {
    fn name(&self) -> String {
        "Scripted Observations".to_string()
    }

    fn estimate(&mut self, _input: &FrameInput) -> EyeObservation {
        self.script.pop_front().unwrap_or_default()
    }
}
