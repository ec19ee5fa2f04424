pub mod account;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod events;
pub mod filter;
pub mod reconcile;
pub mod service;
pub mod suggest;
pub mod task;
pub mod view;

pub use account::AccountService;
pub use error::{EntityKind, Error, Result};
pub use service::TaskService;
