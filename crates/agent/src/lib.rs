//! The DawnAgent conversational turn loop.
//!
//! One session runs per process:
//!
//! 1. **Start**: check the model is available, assemble the prompt from the
//!    agent directory's templates, open a model session with it
//! 2. **Turn**: send the user's message, one-shot or streamed fragment by
//!    fragment, then parse the reply into speech text, display text and an
//!    optional memory update
//! 3. **Persist**: write any memory update into the memory document
//! 4. **End**: close the session and report the memory document's size
//!    against its budget

pub mod context;
pub mod handle;
pub mod parser;
pub mod session;

pub use context::{ContextAssembler, ContextOptions, SessionContext, TemplateSet, TemplateStore};
pub use handle::{GenerationSettings, ModelHandle};
pub use parser::{parse, parse_emotion_lines};
pub use session::{SessionController, SessionPhase, SessionSettings};
