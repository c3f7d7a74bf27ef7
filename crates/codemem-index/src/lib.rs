pub mod change;
pub mod graph;
pub mod indexer;
pub mod report;
pub mod snapshot;

pub use change::*;
pub use graph::*;
pub use indexer::*;
pub use report::*;
pub use snapshot::*;
