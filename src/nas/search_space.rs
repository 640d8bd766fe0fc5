//! NAS Search Space Definition
//!
//! Shared state and the common interface of token-encoded search spaces.
//! A search space maps a fixed-length token vector onto a network topology;
//! the range table bounds each token position.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::layers::NetArch;
use crate::error::{KolosalError, Result};

/// Largest block count any search space accepts
pub const MAX_BLOCK_NUM: usize = 5;

/// Interface the outer search driver programs against
pub trait SearchSpace: Send + Sync + std::fmt::Debug {
    /// Registry key of this search space
    fn name(&self) -> &'static str;

    /// Shared construction state
    fn base(&self) -> &SearchSpaceBase;

    /// Mutable shared state
    fn base_mut(&mut self) -> &mut SearchSpaceBase;

    /// Baseline token vector
    fn init_tokens(&self) -> Vec<usize>;

    /// Exclusive upper bound of every token position
    fn range_table(&self) -> Vec<usize>;

    /// Decode tokens into an architecture. `None` uses the current tokens.
    fn token2arch(&self, tokens: Option<&[usize]>) -> Result<NetArch>;

    /// Current token vector, the baseline until one is set
    fn tokens(&self) -> Vec<usize> {
        match &self.base().tokens {
            Some(tokens) => tokens.clone(),
            None => self.init_tokens(),
        }
    }

    /// Replace the current token vector after checking it against the range table
    fn set_tokens(&mut self, tokens: Vec<usize>) -> Result<()> {
        validate_tokens(&tokens, &self.range_table())?;
        self.base_mut().tokens = Some(tokens);
        Ok(())
    }
}

/// Construction parameters shared by all search spaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpaceBase {
    /// Input feature map size
    pub input_size: usize,
    /// Expected output feature map size (1 means "classifier head")
    pub output_size: usize,
    /// Number of downsampling stages
    pub block_num: usize,
    /// Token vector held for decoding without explicit tokens
    tokens: Option<Vec<usize>>,
}

impl SearchSpaceBase {
    /// Create the base state, validating sizes and block count
    pub fn new(input_size: usize, output_size: usize, block_num: usize) -> Result<Self> {
        if block_num == 0 || block_num > MAX_BLOCK_NUM {
            return Err(KolosalError::invalid_parameter(
                "block_num",
                block_num,
                format!("block number must be in [1, {}]", MAX_BLOCK_NUM),
            ));
        }
        if input_size == 0 {
            return Err(KolosalError::invalid_parameter(
                "input_size",
                input_size,
                "must be positive",
            ));
        }
        if output_size == 0 {
            return Err(KolosalError::invalid_parameter(
                "output_size",
                output_size,
                "must be positive",
            ));
        }

        Ok(Self {
            input_size,
            output_size,
            block_num,
            tokens: None,
        })
    }
}

/// Check length and per-position bounds of a token vector
pub fn validate_tokens(tokens: &[usize], range_table: &[usize]) -> Result<()> {
    if tokens.len() != range_table.len() {
        return Err(KolosalError::ShapeError {
            expected: format!("{} tokens", range_table.len()),
            actual: format!("{} tokens", tokens.len()),
        });
    }

    for (position, (&value, &bound)) in tokens.iter().zip(range_table).enumerate() {
        if value >= bound {
            return Err(KolosalError::TokenOutOfRange { position, value, bound });
        }
    }
    Ok(())
}

/// Sample a token vector uniformly inside the range table
///
/// Every bound must be positive; a zero bound admits no valid token.
pub fn random_tokens<R: Rng + ?Sized>(range_table: &[usize], rng: &mut R) -> Result<Vec<usize>> {
    if let Some(position) = range_table.iter().position(|&bound| bound == 0) {
        return Err(KolosalError::invalid_parameter(
            "range_table",
            format!("0 at position {}", position),
            "every bound must be positive",
        ));
    }
    Ok(range_table.iter().map(|&bound| rng.gen_range(0..bound)).collect())
}
