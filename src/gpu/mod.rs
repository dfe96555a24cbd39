//! wgpu rendering backend
//!
//! Draws the same display list as the CPU rasterizer, off-screen, and reads
//! the pixels back so hosts get an identical [`Canvas`](crate::canvas::Canvas)
//! surface.
//!
//! # Primitives
//!
//! - **Shapes**: disks, half disks, lenses and (dashed) lines, all evaluated
//!   per pixel in one instanced pipeline
//! - **Atlas quads**: score pills and labels sampled from the label atlas,
//!   uploaded only when the atlas changed
//!
//! Avatars are drawn as flat disks in the image's mean color; thumbnails are
//! a CPU-backend feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use graphscene::{EngineConfig, Backend, build_engine};
//!
//! let config = EngineConfig { backend: Backend::Gpu, ..Default::default() };
//! let mut engine = build_engine(&config)?;
//! engine.frame(0.0);
//! engine.save_png("frame.png".as_ref())?;
//! ```

mod renderer;
mod shaders;
mod types;

pub use renderer::{GpuRenderer, create_render_device};
pub use shaders::{quad_shader, shape_shader};
pub use types::{QuadInstance, ShapeInstance, ViewUniforms, mean_color};
