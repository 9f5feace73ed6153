//! Handler-wide configuration.
//!
//! Kept as one small, explicit struct rather than a settings DSL: this core
//! has a handful of real knobs, not a target/ISA matrix, so
//! `cranelift-codegen`'s `settings` machinery would be the wrong shape to
//! imitate here. A plain struct passed to [`CodeHandler::with_config`](crate::handler::CodeHandler::with_config)
//! is enough.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandlerConfig {
    /// Beyond the unconditional parameter-parameter folding every `CG`
    /// operator overload performs (two known constants always combine to
    /// a constant, with no handler involved at all), additionally elide
    /// identity-element operations against a node (`x + 0`, `x * 1`,
    /// `x / 1`, `x * 0`) instead of allocating a no-op node for them.
    pub constant_folding: bool,

    /// Instructs downstream emitters that independents with no dependent
    /// referencing them still need a defined (zero) derivative.
    pub zero_dependent: bool,

    /// Upper bound on the number of paths [`CodeHandler::find_paths`](crate::handler::CodeHandler::find_paths)
    /// collects before stopping early. The solver always calls with `2`
    /// (it only needs to know whether there is zero, one, or more than
    /// one path); this is exposed for callers doing plain reachability
    /// queries who want more than a yes/no/ambiguous answer.
    pub max_paths: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            constant_folding: true,
            zero_dependent: false,
            max_paths: 2,
        }
    }
}
