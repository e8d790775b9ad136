// THEORY:
// Both clustering stages are fixed-point iterations: repeat an assign/update round
// until the centroids stop moving or an iteration cap runs out. `Convergence` is
// the shared record of how such a loop ended, and it is what the pipeline reports
// for each stage.

/// How an iterative solve ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    pub iterations: usize,
    pub error: f64,
    /// `false` when the iteration cap stopped the loop first.
    pub converged: bool,
}

impl Convergence {
    pub fn settled(iterations: usize, error: f64) -> Self {
        Self {
            iterations,
            error,
            converged: true,
        }
    }

    pub fn capped(iterations: usize, error: f64) -> Self {
        Self {
            iterations,
            error,
            converged: false,
        }
    }
}
