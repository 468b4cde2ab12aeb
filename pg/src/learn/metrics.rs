/// Exponential moving average of episode rewards, kept as a series keyed by episode index.
///
/// The first sample initializes the average; afterwards `avg = avg * decay + sample * (1 - decay)`.
#[derive(Clone, Debug)]
pub struct RewardMovingAverage {
    decay: f32,
    average: Option<f32>,
    series: Vec<(usize, f32)>,
}

impl RewardMovingAverage {
    pub fn new(decay: f32) -> Self {
        assert!((0.0..=1.0).contains(&decay));
        Self {
            decay,
            average: None,
            series: vec![],
        }
    }

    /// Feeds the reward sum of `episode` in and returns the updated average
    pub fn record(
        &mut self,
        reward_sum: f32,
        episode: usize,
    ) -> f32 {
        let average = match self.average {
            None => reward_sum,
            Some(avg) => avg * self.decay + reward_sum * (1.0 - self.decay),
        };
        self.average = Some(average);
        self.series.push((episode, average));
        average
    }

    pub fn average(&self) -> Option<f32> { self.average }

    /// (episode index, average) pairs in the order they were recorded
    pub fn series(&self) -> &[(usize, f32)] { &self.series }
}

impl Default for RewardMovingAverage {
    fn default() -> Self { Self::new(0.99) }
}
