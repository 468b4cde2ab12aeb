use image::Pixel;

use crate::frame::preprocess::BinaryFrame;

/// How the policy input is assembled from the most recent preprocessed frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateMode {
    /// current frame minus the previous one (values -1, 0, 1)
    FrameDelta,
    /// the n most recent frames stacked along the last axis
    FrameStack(usize),
}

impl StateMode {
    /// Number of frames needed to build a state
    pub fn history_len(&self) -> usize {
        match self {
            StateMode::FrameDelta => 2,
            StateMode::FrameStack(n) => *n,
        }
    }

    /// `frames` ordered oldest first; exactly [Self::history_len] of them
    pub fn build(
        &self,
        frames: &[BinaryFrame],
    ) -> State {
        assert_eq!(frames.len(), self.history_len(), "frame history not filled");
        match self {
            StateMode::FrameDelta => State::frame_delta(&frames[0], &frames[1]),
            StateMode::FrameStack(_) => State::frame_stack(frames),
        }
    }
}

/// Observation fed into the policy.
///
/// Layout: `[height, width, channels]`, row-major, channels last.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    dims: [usize; 3],
    values: Vec<f32>,
}

impl State {
    pub fn frame_delta(
        previous: &BinaryFrame,
        current: &BinaryFrame,
    ) -> Self {
        assert_eq!(previous.dimensions(), current.dimensions());
        let (width, height) = current.dimensions();
        let values = previous
            .pixels()
            .zip(current.pixels())
            .map(|(p, c)| c.channels()[0] as f32 - p.channels()[0] as f32)
            .collect();
        Self {
            dims: [height as usize, width as usize, 1],
            values,
        }
    }

    pub fn frame_stack(frames: &[BinaryFrame]) -> Self {
        assert!(!frames.is_empty());
        let (width, height) = frames[0].dimensions();
        debug_assert!(frames.iter().all(|f| f.dimensions() == (width, height)));

        let num_frames = frames.len();
        let mut values = vec![0.0; width as usize * height as usize * num_frames];
        for (hist, frame) in frames.iter().enumerate() {
            for (x, y, pixel) in frame.enumerate_pixels() {
                let i = (y as usize * width as usize + x as usize) * num_frames + hist;
                values[i] = pixel.channels()[0] as f32;
            }
        }
        Self {
            dims: [height as usize, width as usize, num_frames],
            values,
        }
    }

    pub fn dims(&self) -> &[usize] { &self.dims }

    pub fn values(&self) -> &[f32] { &self.values }
}
