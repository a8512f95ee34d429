//! Back-office catalog administration: product list, editing sessions over a
//! product form-state tree, and the persistence/image collaborators they use.

pub mod config;
pub mod defaults;
pub mod error;
pub mod form;
pub mod handlers;
pub mod listing;
pub mod models;
pub mod session;
pub mod store;
pub mod upload;
