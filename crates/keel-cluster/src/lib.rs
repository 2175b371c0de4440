pub mod description;
pub mod election;
pub mod endpoint;
pub mod error;
pub mod id;
pub mod master;
pub mod persist;
