pub mod api;
pub mod context;
pub mod error;
pub mod state;
pub mod storage;
