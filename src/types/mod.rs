//! Public types for the Slipstream API.

mod descriptor;
mod message;
mod options;
mod response;

pub use descriptor::RequestDescriptor;
pub use message::{Message, Role};
pub use options::GenerationParams;
pub use response::{Completion, Usage};
