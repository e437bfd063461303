// src/types.rs
use crate::drivers::Chunk;

// One acquisition tick, tagged with the slice it belongs to
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedChunk {
    pub sweep_index: usize,
    pub chunk: Chunk,
}

// Acquisition thread -> GUI
#[derive(Clone, Debug)]
pub enum ScopeMessage {
    Chunk(PublishedChunk),
    // inlet fault, acquisition has ended
    InletLost(String),
}
