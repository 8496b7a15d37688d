//! Path → policy category lookup.

mod pattern;

pub use pattern::PatternRouter;
