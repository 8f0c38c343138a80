//! Heap engine implementation
//!
//! `block` overlays headers on the arena, `fit` chooses free blocks and
//! `heap` ties them together.

pub mod block;
pub mod fit;
pub mod heap;

#[cfg(test)]
mod shadow;
