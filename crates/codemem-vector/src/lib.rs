pub mod batch;
pub mod memory;
pub mod openai;
pub mod payload;
pub mod provider;
pub mod qdrant;
pub mod store;
pub mod voyage;

pub use batch::*;
pub use memory::*;
pub use openai::*;
pub use payload::*;
pub use provider::*;
pub use qdrant::*;
pub use store::*;
pub use voyage::*;
