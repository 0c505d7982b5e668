//! Lazy prime-number schedule for table growth.
//!
//! Grounded on `src/primegen/primegen.cpp`: a segmented sieve produces
//! primes in increasing order, but only a thinned subset is admitted into
//! the schedule — a candidate is admitted only once it exceeds the last
//! admitted prime scaled by a growth factor that shrinks as the magnitude
//! grows, so table sizes grow close to geometrically without every prime
//! in a segment becoming a table size.

use std::collections::VecDeque;

const SEGMENT_SIZE: u64 = 1_000_000;
const DEFAULT_MAX_LIMIT: u64 = 1_000_000_000;
const FIRST_THRESHOLD_BASE: u64 = 2053;

fn growth_factor(magnitude: u64) -> f64 {
    if magnitude < 100_000 {
        4.0
    } else if magnitude < 1_000_000 {
        1.5
    } else if magnitude < 10_000_000 {
        1.2
    } else if magnitude < 100_000_000 {
        1.1
    } else {
        1.05
    }
}

/// Produces successive prime table sizes on demand, sieving one segment at a
/// time rather than the whole range up front.
pub struct Primegen {
    small_primes: Vec<u64>,
    cursor: u64,
    threshold_base: u64,
    admitted: VecDeque<u64>,
    exhausted: bool,
}

impl Primegen {
    pub fn new() -> Self {
        let sqrt_limit = (DEFAULT_MAX_LIMIT as f64).sqrt() as u64 + 1;
        Primegen {
            small_primes: sieve_small_primes(sqrt_limit),
            cursor: 2,
            threshold_base: FIRST_THRESHOLD_BASE,
            admitted: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Returns the next admitted prime, sieving additional segments as
    /// needed. Returns `None` once the configured limit is exhausted — a
    /// shard this far into resizes has larger problems than prime supply.
    pub fn pop_next(&mut self) -> Option<u64> {
        while self.admitted.is_empty() && !self.exhausted {
            self.sieve_next_segment();
        }
        self.admitted.pop_front()
    }

    fn sieve_next_segment(&mut self) {
        let low = self.cursor.max(2);
        if low >= DEFAULT_MAX_LIMIT {
            self.exhausted = true;
            return;
        }
        let high = (low + SEGMENT_SIZE).min(DEFAULT_MAX_LIMIT);
        let width = (high - low) as usize;
        let mut is_prime = vec![true; width];

        for &p in &self.small_primes {
            if p * p >= high {
                break;
            }
            let mut start = ((low + p - 1) / p) * p;
            if start < p * p {
                start = p * p;
            }
            let mut m = start;
            while m < high {
                is_prime[(m - low) as usize] = false;
                m += p;
            }
        }

        for (offset, flag) in is_prime.iter().enumerate() {
            if !flag {
                continue;
            }
            let n = low + offset as u64;
            if n < 2 {
                continue;
            }
            let threshold = (self.threshold_base as f64 * growth_factor(self.threshold_base)) as u64;
            if n >= threshold {
                self.admitted.push_back(n);
                self.threshold_base = n;
            }
        }

        self.cursor = high;
        if self.cursor >= DEFAULT_MAX_LIMIT {
            self.exhausted = true;
        }
    }
}

impl Default for Primegen {
    fn default() -> Self {
        Self::new()
    }
}

fn sieve_small_primes(limit: u64) -> Vec<u64> {
    let limit = limit as usize;
    let mut is_prime = vec![true; limit + 1];
    is_prime[0] = false;
    if limit >= 1 {
        is_prime[1] = false;
    }
    let mut p = 2usize;
    while p * p <= limit {
        if is_prime[p] {
            let mut m = p * p;
            while m <= limit {
                is_prime[m] = false;
                m += p;
            }
        }
        p += 1;
    }
    (2..=limit).filter(|&n| is_prime[n]).map(|n| n as u64).collect()
}
