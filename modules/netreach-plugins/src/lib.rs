//! Plugin Registry & Base (spec §4.F), plus two reference backends.

pub mod html_plugin;
pub mod json_plugin;
pub mod plugin;
pub mod registry;

pub use html_plugin::HtmlScrapePlugin;
pub use json_plugin::JsonApiPlugin;
pub use plugin::{Plugin, PluginSearchOutcome};
pub use registry::PluginRegistry;
