#![allow(clippy::new_without_default)]

pub mod config;
pub mod data;
pub mod error;
pub mod presenter;
pub mod promise;
pub mod resolver;
pub mod store;
pub mod tab_id;
pub mod util;
pub mod webapi;

#[cfg(test)]
mod testing;
