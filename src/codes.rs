//! Short code generation

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of generated codes
pub const CODE_LENGTH: usize = 7;

/// Source of candidate codes
///
/// Uniqueness is not guaranteed, the store decides whether a code is still free
pub trait CodeGenerator: Send + Sync {
    /// Generate a candidate code of the given length
    fn generate(&self, length: usize) -> String;
}

/// Random alphanumeric codes
///
/// Drawn from the 62 characters `[A-Za-z0-9]` using the thread-local CSPRNG
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self, length: usize) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}
