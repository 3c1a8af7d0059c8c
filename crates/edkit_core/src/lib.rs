//! edkit Core
//!
//! Host-side building blocks shared by the scripting layer and the editor:
//! - Level object model and the `EditorHost` seam scripts talk to
//! - Fixed-rate frame clock for the editor update loop

pub mod level;
pub mod time;

pub use glam;

/// Editor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
