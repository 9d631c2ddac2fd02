//! # Consensus
//!
//! The chain's decision-making: what a header is, when a witness counts,
//! how much work the next block owes, and which fork is the truth.

pub mod difficulty;
pub mod engine;
pub mod header;
pub mod pow;

pub use engine::{Blockchain, ChainGraph, ExploreBlock, GraphEdge, GraphNode, ScoreReport};
pub use header::{Block, Hash, Header, ProcessedHeader};
