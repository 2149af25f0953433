//! # ndpx-rules: Pushdown Eligibility and Plan Rewrite
//!
//! The engine that rewrites Scan→Filter→Project (and optionally Aggregate)
//! plan fragments so that filtering, column projection, and aggregation are
//! executed by a remote storage/compute tier instead of the local engine.
//!
//! ## Pipeline
//!
//! The driver discovers candidate fragments top-down; the eligibility gate
//! filters them; the attribute resolver and predicate classifier extract and
//! classify the work; the relation rewriter builds the replacement fragment,
//! consulting the size estimator (and, for aggregate fragments, the
//! aggregate validator); the driver substitutes the replacement in place.
//!
//! ## Fail-closed
//!
//! Any expression the engine does not recognize keeps its fragment local.
//! There is no fatal error path in normal operation: classification and
//! serialization failures degrade to "no pushdown", never to a wrong plan.
//!
//! - **`resolve`**: attribute resolution over alias/cast/column shapes.
//! - **`classify`**: predicate classification into the tri-state pushdown
//!   status.
//! - **`aggregate`**: aggregate validation, deduplication, and the
//!   (feature-gated) two-stage aggregate rewrite.
//! - **`gate`**: per-fragment eligibility checks.
//! - **`relation`**: the relation descriptor derived from a scan.
//! - **`rewrite`**: the central rewrite algorithm.
//! - **`estimate`**: row/byte estimates for rewritten relations.
//! - **`driver`**: the rule trait, fragment matching, and fix-point pass
//!   loop.

pub mod aggregate;
pub mod classify;
pub mod driver;
pub mod estimate;
pub mod gate;
pub mod relation;
pub mod resolve;
pub mod rewrite;

pub use classify::PushdownStatus;
pub use driver::{default_rules, optimize, NdpPushdownRule, PushdownConfig, Rule, RuleContext};
