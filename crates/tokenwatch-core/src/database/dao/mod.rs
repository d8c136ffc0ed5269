//! Data access objects, one per record kind

mod cost_config;
mod health;
mod usage;
