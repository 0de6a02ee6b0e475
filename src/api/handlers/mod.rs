//! REST API handlers organized by domain.

pub mod ask;
pub mod chain;
pub mod chat;
pub mod health;
pub mod statements;
pub mod verify;

pub use ask::*;
pub use chain::*;
pub use chat::*;
pub use health::*;
pub use statements::*;
pub use verify::*;
