pub mod auth;
pub mod catalog;
pub mod create;
pub mod delete;
pub mod list;
pub mod power;
pub mod quota;
pub mod resize;
pub mod show;
pub mod sync;
