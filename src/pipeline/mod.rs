//! Pipeline stages from evidence to sealed report.
//!
//! Each submodule implements one step and can be tested on its own. The two
//! third-party renderers (Markdown and PDF) and the model transport sit behind
//! small traits so the stages around them run against fakes in tests.
//!
//! ## Data Flow
//!
//! ```text
//! evidence ──▶ compose ──▶ model ──▶ tidy ──▶ render ──▶ layout ──▶ seal
//! (base64)     (parts)     (call)   (clean)   (HTML)    (pages)    (SHA-256)
//! ```
//!
//! 1. [`evidence`]: load files and turn them into inline request parts
//! 2. [`compose`]: choose the model variant and order the parts
//! 3. [`model`]: the single external call; the only stage with network I/O
//! 4. [`tidy`]: deterministic clean-up of the returned Markdown
//! 5. [`render`]: Markdown → HTML, with a plain fallback that never fails
//! 6. [`layout`]: paginate title and report text onto A4 pages
//! 7. [`seal`]: digest the unsealed document, then stamp the digest on it
//!
//! [`pdf`] is the pdfium implementation of the document backend used by `seal`.

pub mod compose;
pub mod evidence;
pub mod layout;
pub mod model;
pub mod pdf;
pub mod render;
pub mod seal;
pub mod tidy;
