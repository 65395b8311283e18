pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod interactions;
pub mod pipeline;
pub mod state;

#[cfg(test)]
mod test_support;
