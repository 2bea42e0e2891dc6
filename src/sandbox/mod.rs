//! Restricted script execution for model-generated fragments
//!
//! The model writes short Rhai scripts to compute an answer. Instead of
//! trusting generated text with ambient process access, the runner hands each
//! fragment a fixed capability surface (HTTP fetch with browser headers, HTML
//! selection, JSON, URL joining, base64, PDF text) plus the credentials and
//! current URL, and nothing else. After the fragment runs, the scope must
//! contain `submission_payload` and `submission_dest`; the payload is
//! sanitized into plain JSON before it leaves the sandbox.

pub mod capabilities;
pub mod runner;
pub mod sanitize;

pub use runner::{ScriptOutcome, ScriptRunner};
pub use sanitize::sanitize;
