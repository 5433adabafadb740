//! Heuristic fuzzing of generated patches.
//!
//! Patches cannot be executed here, so "running" a fuzz case means checking
//! whether the patch text contains the defensive idioms that input would need
//! (None checks, emptiness checks, exception handling).
//!
//! # Architecture
//!
//! - [`signature`]: extracts added `def` signatures and classifies their type hints
//! - [`value_gen`]: edge-heavy random Python values per parameter type
//! - [`runner`]: [`FuzzTester`], which builds edge-case and random cases and
//!   judges them against the patch
//! - [`report`]: result types

pub mod report;
pub mod runner;
pub mod signature;
pub mod value_gen;

pub use report::{CaseVerdict, ExpectedBehavior, FuzzResult, FuzzStatistics, FuzzTestCase};
pub use runner::{extract_keywords, FuzzConfig, FuzzTester};
pub use signature::{extract_function_signatures, FunctionSignature, Param, ParamType};
pub use value_gen::{FuzzValue, ValueGenerator};
