//! Pipeline stages for turning a queued document into page texts.
//!
//! Each submodule implements exactly one step, and every external tool sits
//! behind a trait so the stages can be exercised with in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──────────▶ recognize ──▶ (assemble)
//! (HTTP)   (pdfinfo, gs)       (tesseract)
//!          └──────── page ────────┘
//!          └─────── bounded (×C) ─┘
//! ```
//!
//! 1. [`input`]: stage the source document under the inbox
//! 2. [`render`]: count pages; rasterise one page to a grayscale PNG
//! 3. [`recognize`]: OCR one page image to UTF-8 text
//! 4. [`page`]: rasterise-then-recognise for one page, with cleanup
//! 5. [`bounded`]: fan the page transform out under a concurrency ceiling
//! 6. [`subprocess`]: cancellable external-tool invocation shared by 2 and 3

pub mod bounded;
pub mod input;
pub mod page;
pub mod recognize;
pub mod render;
pub mod subprocess;
