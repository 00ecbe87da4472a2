pub mod error;
pub mod openrouter;
pub mod schema;
pub mod util;

pub use error::{AiError, Result};
pub use openrouter::{parse_structured, OpenRouter};
pub use schema::StructuredOutput;
pub use util::{strip_code_blocks, truncate_to_char_boundary};
