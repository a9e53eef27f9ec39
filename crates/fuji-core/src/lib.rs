pub mod actions;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod reducer;
pub mod rules;
pub mod state;
pub mod store;

pub use actions::*;
pub use error::*;
pub use models::*;
pub use reducer::*;
pub use rules::*;
pub use state::*;
pub use store::*;

pub use persistence::*;
