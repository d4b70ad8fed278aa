//! Test and helper mocks for gaze_core

use std::collections::VecDeque;

use gaze_traits::{CursorActuator, FeatureSource, GazeFeature, ScreenPoint};

/// A source that never has a feature; useful when driving the pipeline with
/// externally sampled features via `process_feature`.
pub struct NoFeatures;

impl FeatureSource for NoFeatures {
    fn read(
        &mut self,
    ) -> Result<Option<GazeFeature>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(None)
    }
}

/// Replays a fixed script of frames, then reports absence forever.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    frames: VecDeque<Option<GazeFeature>>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = Option<GazeFeature>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FeatureSource for ScriptedSource {
    fn read(
        &mut self,
    ) -> Result<Option<GazeFeature>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.frames.pop_front().flatten())
    }
}

/// A source whose every read fails.
pub struct FailingSource;

impl FeatureSource for FailingSource {
    fn read(
        &mut self,
    ) -> Result<Option<GazeFeature>, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("camera unavailable")))
    }
}

/// Records every point it is asked to move to.
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    pub moves: Vec<ScreenPoint>,
    /// Fail every call when set.
    pub fail: bool,
}

impl CursorActuator for RecordingActuator {
    fn move_to(&mut self, p: ScreenPoint) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("pointer grab lost")));
        }
        self.moves.push(p);
        Ok(())
    }
}
