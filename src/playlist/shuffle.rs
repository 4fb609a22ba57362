//! Shuffle permutation over playlist positions.

use rand::Rng;
use rand::seq::SliceRandom;

/// A permutation of `[0, total)`.
///
/// `order[i]` is the linear position played at shuffled step `i`. The
/// order is rebuilt wholesale by [`ShuffleOrder::generate`]; it is never
/// patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShuffleOrder {
    order: Vec<usize>,
}

impl ShuffleOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh permutation, keeping `anchor` first when it is valid.
    pub fn generate(&mut self, total: usize, anchor: Option<usize>) {
        self.generate_with_rng(total, anchor, &mut rand::rng());
    }

    /// Same as [`generate`](Self::generate) with an explicit RNG.
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &mut self,
        total: usize,
        anchor: Option<usize>,
        rng: &mut R,
    ) {
        let mut order: Vec<usize> = (0..total).collect();

        match anchor.filter(|&a| a < total) {
            Some(anchor) => {
                order.swap(0, anchor);
                order[1..].shuffle(rng);
            }
            None => order.shuffle(rng),
        }

        tracing::debug!(target: "playlist::shuffle", total, ?anchor, "Generated shuffle order");
        self.order = order;
    }

    /// Shuffled value at step `linear` (direct index).
    pub fn to_shuffled(&self, linear: usize) -> Option<usize> {
        self.order.get(linear).copied()
    }

    /// Step at which `shuffled` appears. Linear search; cache on hot paths.
    pub fn to_linear(&self, shuffled: usize) -> Option<usize> {
        self.order.iter().position(|&v| v == shuffled)
    }

    /// Up to `n` values following `current`, without wrapping around.
    pub fn next_n(&self, current: usize, n: usize) -> Vec<usize> {
        match self.to_linear(current) {
            Some(pos) => self.order[pos + 1..].iter().take(n).copied().collect(),
            None => Vec::new(),
        }
    }

    /// The value following `current`, if any.
    pub fn next(&self, current: usize) -> Option<usize> {
        let pos = self.to_linear(current)?;
        self.order.get(pos + 1).copied()
    }

    /// The value preceding `current`, or `None` at the start.
    pub fn previous(&self, current: usize) -> Option<usize> {
        let pos = self.to_linear(current)?;
        pos.checked_sub(1).map(|p| self.order[p])
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}
