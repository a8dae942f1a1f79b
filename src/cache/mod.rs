//! Persistent compiler cache
//!
//! Recompiling the same project under several flag sets is mostly cache
//! hits for ccache, so every container mounts the same named volume.
//!
//! The volume is created with labels on first use and is never deleted
//! by this tool; concurrent access is left to ccache itself.

pub mod volume;

pub use volume::{ensure_cache_volume, labels, CacheVolume};
