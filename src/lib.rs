//! # Tessera Scene Graph Library
//!
//! A damage-tracked scene graph for compositors: client surfaces and
//! decorations form an item tree, outputs and offscreen consumers are
//! views onto it, and only what changed is repainted.
//!
//! ## Architecture
//!
//! - `geometry`: points, rectangles, regions and buffer transforms
//! - `quads`: window quads, interleaved vertices and per-type splitting
//! - `scene`: the item tree, surfaces and their pixmaps, views and the
//!   `Scene` orchestrating the paint cycle
//! - `renderer`: the renderer interface, a tiny-skia software renderer and
//!   the swap profiler
//! - `config`: TOML configuration of the headless compositor
//! - `compositor`: headless frame loop driving the scene
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tessera::{HeadlessCompositor, TesseraConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TesseraConfig::load("~/.config/tessera/tessera.toml")?;
//!     let mut compositor = HeadlessCompositor::new(config)?;
//!     let stats = compositor.run().await?;
//!     println!("{} frames painted", stats.painted_frames);
//!     Ok(())
//! }
//! ```

pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod quads;
pub mod renderer;
pub mod scene;

// Re-export main types for easy access
pub use compositor::{FrameStats, HeadlessCompositor};
pub use config::TesseraConfig;
pub use error::{SceneError, SceneResult, TextureError};
pub use scene::{Scene, SceneSettings};

/// Version information for Tessera
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
