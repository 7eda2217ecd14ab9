//! Statistical overlays for US county choropleth maps.
//!
//! County boundaries are matched to population and economic statistics,
//! enriched with derived metrics and rendered onto a [`binding::MapSurface`]
//! by independently toggled [`overlay::Overlay`]s.

pub mod binding;
pub mod boundaries;
pub mod config;
pub mod enhance;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod normalize;
pub mod overlay;
pub mod profile;
pub mod server;
pub mod session;
pub mod stats;
pub mod style;
pub mod surface;
pub mod types;
