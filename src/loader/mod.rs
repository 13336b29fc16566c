//! ELF loading and initial user-stack construction (spec §4.4/§6).

pub mod elf;
pub mod stack;

pub use elf::{LoadError, LoadedImage};
