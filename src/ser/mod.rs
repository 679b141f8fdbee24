//! # Serialization. Converts a tree of LLSDValue structs to an LLSD stream.
pub mod binary;
pub mod json;
pub mod notation;
pub mod xml;
