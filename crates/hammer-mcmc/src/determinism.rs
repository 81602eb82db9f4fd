use hammer_core::derive_substream_seed;

const INIT_SALT: u64 = 0xA5A5_A5A5_A5A5_A5A5;

/// Seed of the stream that draws initial walker or live-point positions.
pub fn init_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ INIT_SALT, 0)
}

/// Seed of the proposal stream for one walker at one iteration.
///
/// Iterations are counted across burn-in and sampling, so a resumed run
/// draws the same proposals as an uninterrupted one.
pub fn step_seed(master_seed: u64, iteration: usize, walker: usize) -> u64 {
    let intermediate = derive_substream_seed(master_seed, iteration as u64);
    derive_substream_seed(intermediate, walker as u64)
}

/// Seed of the ensemble-wide stream of one iteration (shuffles, slice draws).
pub fn iteration_seed(master_seed: u64, iteration: usize) -> u64 {
    derive_substream_seed(master_seed, (iteration as u64) << 32 | 0xFFFF_FFFF)
}

/// Seed used to replace the worst live point at a nested-sampling iteration.
pub fn replacement_seed(master_seed: u64, iteration: usize) -> u64 {
    derive_substream_seed(master_seed ^ INIT_SALT, iteration as u64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_are_distinct() {
        let master = 42;
        assert_ne!(step_seed(master, 0, 1), step_seed(master, 1, 0));
        assert_ne!(init_seed(master), replacement_seed(master, 0));
        assert_eq!(step_seed(master, 3, 2), step_seed(master, 3, 2));
    }
}
