//! HTTP Request Handlers

pub mod chat;
pub mod health;
pub mod tools;
