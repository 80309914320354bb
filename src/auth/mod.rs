mod caller;
mod resources;

pub mod authorizor;

pub use caller::Caller;
