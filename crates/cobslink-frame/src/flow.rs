//! Watermark-driven flow control with hysteresis.

/// Whether the remote may keep transmitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Flowing,
    Paused,
}

impl FlowState {
    /// Level to drive on the flow-control line.
    pub fn is_ready(self) -> bool {
        matches!(self, FlowState::Flowing)
    }
}

/// Tracks intake occupancy against a high and a low watermark.
///
/// Pauses once occupancy reaches `high`, resumes once it falls to `low`.
/// Occupancy strictly between the two never changes state.
#[derive(Debug, Clone)]
pub struct FlowController {
    high: usize,
    low: usize,
    state: FlowState,
}

impl FlowController {
    /// A controller starting in [`FlowState::Flowing`]. Requires `low < high`.
    pub fn new(high: usize, low: usize) -> Self {
        debug_assert!(low < high, "low watermark must be below high watermark");
        Self {
            high,
            low,
            state: FlowState::Flowing,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn high_watermark(&self) -> usize {
        self.high
    }

    pub fn low_watermark(&self) -> usize {
        self.low
    }

    /// Re-evaluate against `occupancy`. Returns the new state on a transition only.
    pub fn update(&mut self, occupancy: usize) -> Option<FlowState> {
        let next = match self.state {
            FlowState::Flowing if occupancy >= self.high => FlowState::Paused,
            FlowState::Paused if occupancy <= self.low => FlowState::Flowing,
            _ => return None,
        };
        self.state = next;
        Some(next)
    }

    /// Back to [`FlowState::Flowing`] without reporting a transition.
    pub fn reset(&mut self) {
        self.state = FlowState::Flowing;
    }
}
