//! Command-line default values shared across help strings and settings structs
//!

pub const DEFAULT_STATE_SET: &str =
    "zero-inflation,monosomy,disomy,trisomy,tetrasomy,multisomy";

pub const DEFAULT_MOST_FREQUENT_STATE: &str = "disomy";

/// Breakpoint refinement scan resolutions in bases, coarse to fine
pub const DEFAULT_RESOLUTION_LEVELS: &str = "10000,1000";
