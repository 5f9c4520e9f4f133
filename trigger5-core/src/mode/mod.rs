//! Display modes: the device catalog, requested timings and the
//! SET_MODE packet derived from them.

pub mod catalog;
pub mod request;
pub mod timing;

pub use catalog::{DeviceMode, MatchPolicy, ModeCatalog, SizeBounds, MAX_MODES};
pub use request::ModeRequest;
pub use timing::{DisplayTiming, SyncFlags, PRESETS};
