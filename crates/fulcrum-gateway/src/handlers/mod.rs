//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

pub mod agents;
pub mod events;
pub mod health;
pub mod jobs;
pub mod services;
pub mod subscriptions;
