//! Built-in tool implementations for threadline.
//!
//! These are demonstration tools that exercise the dispatcher end-to-end:
//! `get_weather` is a plain synchronous lookup, `count_slowly` produces
//! incremental output and exercises the streamed tool-result path.
//! Production deployments register their own tools alongside or instead of
//! these.

pub mod count_slowly;
pub mod weather_lookup;

pub use count_slowly::CountSlowlyTool;
pub use weather_lookup::WeatherLookupTool;

use threadline_core::tool::ToolRegistry;

/// Create a default tool registry with the built-in demo tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WeatherLookupTool));
    registry.register(Box::new(CountSlowlyTool::default()));
    registry
}
