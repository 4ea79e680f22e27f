//! Type definitions

pub mod calendar;
pub mod coordinates;
pub mod messages;
pub mod order;
pub mod plan;
pub mod schedule;
pub mod settings;

pub use calendar::*;
pub use coordinates::*;
pub use messages::*;
pub use order::*;
pub use plan::*;
pub use schedule::*;
pub use settings::*;
