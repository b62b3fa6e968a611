//! Pipeline stages for DOCX-to-PDF conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ surface ──▶ layout ──▶ render ──▶ paginate ──▶ assemble
//! (DOCX→HTML)  (DOM)      (boxes)    (pixels)   (offsets)    (PDF)
//! ```
//!
//! 1. [`extract`]: unzip the package and map paragraphs, runs, tables and
//!    drawings to an HTML fragment through the [`stylemap`] rules
//! 2. [`surface`]: parse the fragment into a styled block tree and attach
//!    it to a [`surface::RenderHost`] for the duration of capture
//! 3. [`layout`]: position text, images and table cells on a virtual page
//! 4. [`render`]: paint the layout into one tall bitmap; runs in
//!    `spawn_blocking` because it is CPU-bound
//! 5. [`paginate`]: compute the page-height bands of the scaled bitmap
//! 6. [`assemble`]: write the bands as image-only PDF pages

pub mod assemble;
pub mod extract;
pub mod layout;
pub mod paginate;
pub mod render;
pub mod stylemap;
pub mod surface;
