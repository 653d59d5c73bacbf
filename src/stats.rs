//! Search statistics: completed lookups and hop counts per strategy.

use crate::net::message::SearchMode;

/// Figures for one search strategy.
///
/// `completed` and `hops` grow together: every result delivered to this
/// originator appends its hop count. Mean and deviation are computed on
/// demand from the stored list.
#[derive(Debug, Clone, Default)]
pub struct ModeStats {
    pub completed: u64,
    pub hops: Vec<u32>,
}

impl ModeStats {
    pub fn record(&mut self, hop_count: u32) {
        self.completed += 1;
        self.hops.push(hop_count);
    }

    /// Mean hop count, 0 when no lookup has completed.
    pub fn mean(&self) -> f64 {
        if self.hops.is_empty() {
            return 0.0;
        }
        self.hops.iter().map(|&h| h as f64).sum::<f64>() / self.hops.len() as f64
    }

    /// Sample standard deviation; 0 for fewer than two samples.
    pub fn stddev(&self) -> f64 {
        let n = self.hops.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .hops
            .iter()
            .map(|&h| {
                let d = h as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    }
}

/// Per-mode statistics for searches this node originated.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    flooding: ModeStats,
    random_walk: ModeStats,
    depth_first: ModeStats,
}

impl SearchStats {
    pub fn record(&mut self, mode: SearchMode, hop_count: u32) {
        self.mode_mut(mode).record(hop_count);
    }

    pub fn mode(&self, mode: SearchMode) -> &ModeStats {
        match mode {
            SearchMode::Flooding => &self.flooding,
            SearchMode::RandomWalk => &self.random_walk,
            SearchMode::DepthFirst => &self.depth_first,
        }
    }

    fn mode_mut(&mut self, mode: SearchMode) -> &mut ModeStats {
        match mode {
            SearchMode::Flooding => &mut self.flooding,
            SearchMode::RandomWalk => &mut self.random_walk,
            SearchMode::DepthFirst => &mut self.depth_first,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_report_zero() {
        let m = ModeStats::default();
        assert_eq!(m.completed, 0);
        assert_eq!(m.mean(), 0.0);
        assert_eq!(m.stddev(), 0.0);
    }

    #[test]
    fn single_sample_has_zero_deviation() {
        let mut m = ModeStats::default();
        m.record(4);
        assert_eq!(m.completed, 1);
        assert_eq!(m.mean(), 4.0);
        assert_eq!(m.stddev(), 0.0);
    }

    #[test]
    fn mean_and_sample_deviation() {
        let mut m = ModeStats::default();
        for h in [2, 4, 4, 4, 5, 5, 7, 9] {
            m.record(h);
        }
        assert_eq!(m.mean(), 5.0);
        // Sample variance of the set above is 32/7.
        assert!((m.stddev() - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn modes_are_tracked_independently() {
        let mut stats = SearchStats::default();
        stats.record(SearchMode::Flooding, 2);
        stats.record(SearchMode::Flooding, 4);
        stats.record(SearchMode::DepthFirst, 9);
        assert_eq!(stats.mode(SearchMode::Flooding).completed, 2);
        assert_eq!(stats.mode(SearchMode::Flooding).mean(), 3.0);
        assert_eq!(stats.mode(SearchMode::RandomWalk).completed, 0);
        assert_eq!(stats.mode(SearchMode::DepthFirst).hops, vec![9]);
    }
}
