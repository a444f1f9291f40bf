//! Session prompt construction.
//!
//! [`TemplateStore`] reads the six fragments of an agent directory and
//! [`ContextAssembler`] joins them, with a session metadata block, into the
//! instructions a session runs under.

pub mod assembler;
pub mod templates;

pub use assembler::{
    ContextAssembler, ContextOptions, DEFAULT_WEATHER, SECTION_DELIMITER, SessionContext,
    session_block, time_bracket,
};
pub use templates::{Template, TemplateSet, TemplateStore, placeholder};
