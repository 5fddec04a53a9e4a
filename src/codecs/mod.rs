// src/codecs/mod.rs
//
// Container formats the engine writes byte-by-byte (ICO) or drives frame-by-frame (GIF).

pub mod gif;
pub mod ico;
