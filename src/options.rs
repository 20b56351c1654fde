//! Keys of the `option` directives understood by the checker.

/// The absolute tolerance of `balexpr` checks. Defaults to `0.005`.
pub const OPTION_BALEXPR_TOLERANCE: &str = "balexpr_tolerance";

/// The absolute tolerance used for balancing transactions and for `balance`
/// assertions. Defaults to `0.005`.
pub const OPTION_DEFAULT_TOLERANCE: &str = "default_tolerance";
