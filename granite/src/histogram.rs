//! Fixed-width selectivity histograms, consumed by the external query
//! optimizer. Not on the execution path.

use crate::errors::ExecError;
use crate::predicate::PredicateOp;

/// A histogram over an integer column with value domain `[min, max]`.
/// The bucket count is capped at the width of the domain so every
/// bucket covers at least one value.
pub struct IntHistogram {
    counts: Vec<usize>,
    min: i32,
    max: i32,
    bucket_width: f64,
    total: usize,
}

impl IntHistogram {
    pub fn new(buckets: usize, min: i32, max: i32) -> Result<Self, ExecError> {
        if buckets == 0 {
            return Err(ExecError::InvalidArgument(
                "a histogram needs at least one bucket".into(),
            ));
        }
        if max < min {
            return Err(ExecError::InvalidArgument(format!(
                "empty value domain [{}, {}]",
                min, max
            )));
        }
        let range = (max as i64 - min as i64 + 1) as f64;
        let num_buckets = buckets.min(range as usize).max(1);
        Ok(Self {
            counts: vec![0; num_buckets],
            min,
            max,
            bucket_width: range / num_buckets as f64,
            total: 0,
        })
    }

    fn bucket_of(&self, v: i32) -> usize {
        let offset = (v as i64 - self.min as i64) as f64;
        ((offset / self.bucket_width) as usize).min(self.counts.len() - 1)
    }

    fn proportion(&self, bucket: usize) -> f64 {
        self.counts[bucket] as f64 / self.total as f64
    }

    /// Records one observed value.
    pub fn add_value(&mut self, v: i32) -> Result<(), ExecError> {
        if v < self.min || v > self.max {
            return Err(ExecError::InvalidArgument(format!(
                "value {} outside the histogram domain [{}, {}]",
                v, self.min, self.max
            )));
        }
        let bucket = self.bucket_of(v);
        self.counts[bucket] += 1;
        self.total += 1;
        Ok(())
    }

    /// Estimated fraction of recorded values satisfying `op v`.
    ///
    /// Equality is the matching bucket's height spread over its width;
    /// range estimates sum whole buckets on the open side plus the
    /// partial fraction of the boundary bucket. Constants outside the
    /// domain clamp to 0 or 1.
    pub fn estimate_selectivity(&self, op: PredicateOp, v: i32) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        match op {
            PredicateOp::Equals => {
                if v < self.min || v > self.max {
                    0.0
                } else {
                    self.proportion(self.bucket_of(v)) / self.bucket_width
                }
            }
            PredicateOp::NotEquals => {
                1.0 - self.estimate_selectivity(PredicateOp::Equals, v)
            }
            PredicateOp::GreaterThan | PredicateOp::GreaterThanOrEq => {
                if v < self.min {
                    return 1.0;
                }
                if v > self.max {
                    return 0.0;
                }
                let bucket = self.bucket_of(v);
                let above: f64 = (bucket + 1..self.counts.len())
                    .map(|b| self.proportion(b))
                    .sum();
                let offset = (v as i64 - self.min as i64) as f64;
                let fraction = 1.0 - (offset % self.bucket_width) / self.bucket_width;
                above + fraction * self.proportion(bucket)
            }
            PredicateOp::LessThan | PredicateOp::LessThanOrEq => {
                if v > self.max {
                    return 1.0;
                }
                if v < self.min {
                    return 0.0;
                }
                let bucket = self.bucket_of(v);
                let below: f64 = (0..bucket).map(|b| self.proportion(b)).sum();
                let offset = (v as i64 - self.min as i64) as f64;
                let fraction = (offset % self.bucket_width) / self.bucket_width;
                below + fraction * self.proportion(bucket)
            }
        }
    }

    /// Mean per-bucket proportion.
    pub fn avg_selectivity(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let sum: f64 = (0..self.counts.len()).map(|b| self.proportion(b)).sum();
        sum / self.counts.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform() -> IntHistogram {
        let mut h = IntHistogram::new(10, 1, 100).unwrap();
        for v in 1..=100 {
            h.add_value(v).unwrap();
        }
        h
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {} to be close to {}",
            actual,
            expected
        );
    }

    #[test]
    fn equality_spreads_a_bucket_over_its_width() {
        let h = uniform();
        assert_close(h.estimate_selectivity(PredicateOp::Equals, 50), 0.01);
        assert_close(h.estimate_selectivity(PredicateOp::NotEquals, 50), 0.99);
    }

    #[test]
    fn range_estimates_track_the_uniform_distribution() {
        let h = uniform();
        let gt = h.estimate_selectivity(PredicateOp::GreaterThan, 50);
        let lt = h.estimate_selectivity(PredicateOp::LessThan, 50);
        assert!(gt > 0.45 && gt < 0.55, "gt estimate {}", gt);
        assert!(lt > 0.45 && lt < 0.55, "lt estimate {}", lt);
        assert!(h.estimate_selectivity(PredicateOp::GreaterThan, 90) < 0.2);
        assert!(h.estimate_selectivity(PredicateOp::LessThan, 10) < 0.2);
    }

    #[test]
    fn out_of_domain_constants_clamp_to_zero_or_one() {
        let h = uniform();
        assert_close(h.estimate_selectivity(PredicateOp::GreaterThan, 0), 1.0);
        assert_close(h.estimate_selectivity(PredicateOp::GreaterThan, 101), 0.0);
        assert_close(h.estimate_selectivity(PredicateOp::LessThan, 101), 1.0);
        assert_close(h.estimate_selectivity(PredicateOp::LessThan, 0), 0.0);
        assert_close(h.estimate_selectivity(PredicateOp::Equals, 101), 0.0);
    }

    #[test]
    fn values_outside_the_domain_are_rejected() {
        let mut h = IntHistogram::new(4, 0, 9).unwrap();
        assert!(h.add_value(-1).is_err());
        assert!(h.add_value(10).is_err());
        assert!(h.add_value(0).is_ok());
        assert!(h.add_value(9).is_ok());
    }

    #[test]
    fn an_empty_histogram_estimates_zero_everywhere() {
        let h = IntHistogram::new(4, 0, 9).unwrap();
        assert_close(h.estimate_selectivity(PredicateOp::Equals, 5), 0.0);
        assert_close(h.estimate_selectivity(PredicateOp::GreaterThan, 5), 0.0);
        assert_close(h.avg_selectivity(), 0.0);
    }

    #[test]
    fn bucket_count_is_capped_by_the_domain_width() {
        let mut h = IntHistogram::new(100, 0, 4).unwrap();
        for v in 0..=4 {
            h.add_value(v).unwrap();
        }
        // Five values across at most five buckets; a point estimate
        // covers a whole bucket.
        assert_close(h.estimate_selectivity(PredicateOp::Equals, 2), 0.2);
    }

    #[test]
    fn skewed_data_skews_the_estimates() {
        let mut h = IntHistogram::new(10, 1, 100).unwrap();
        for _ in 0..90 {
            h.add_value(5).unwrap();
        }
        for v in 91..=100 {
            h.add_value(v).unwrap();
        }
        assert!(
            h.estimate_selectivity(PredicateOp::Equals, 5)
                > h.estimate_selectivity(PredicateOp::Equals, 95)
        );
        assert!(h.estimate_selectivity(PredicateOp::LessThan, 50) > 0.8);
    }

    #[test]
    fn average_selectivity_of_uniform_data() {
        let h = uniform();
        assert_close(h.avg_selectivity(), 0.1);
    }
}
