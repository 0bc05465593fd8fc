//! Manuscript translation backed by the Gemini API.
//!
//! [`Translator`] streams a translation fragment by fragment, or asks for a
//! single structured result with the detected source language and optional
//! translator's notes. [`Workspace`] is the editor screen's state, driving the
//! streaming path.

pub mod apis;
pub mod transport;
pub mod translation;
pub mod utilities;
pub mod workspace;

pub use transport::{FragmentStream, GeminiTransport, GenerationTransport, TransportError};
pub use translation::{
    Language, Tone, TranslationError, TranslationFailure, TranslationOptions, TranslationRequest,
    TranslationResult, Translator,
};
pub use utilities::config::Config;
pub use workspace::{Clipboard, Workspace, WorkspaceState};
