//! Filenames of all artifacts shared between the segment and aggregate steps
//!

pub const SETTINGS_FILENAME: &str = "settings.json";
pub const RUN_STATS_FILENAME: &str = "run_stats.json";

pub const MODEL_JSON_FILENAME: &str = "model.json";
pub const SEGMENT_MESSAGEPACK_FILENAME: &str = "segments.mpack";
pub const SEGMENT_BEDGRAPH_FILENAME: &str = "segments.bedgraph";
pub const SCE_EVENTS_MESSAGEPACK_FILENAME: &str = "sce_events.mpack";
pub const SCE_EVENTS_BED_FILENAME: &str = "sce_events.bed";

pub const HOTSPOT_BED_FILENAME: &str = "hotspots.bed";
pub const CONSENSUS_JSON_FILENAME: &str = "consensus.json";
