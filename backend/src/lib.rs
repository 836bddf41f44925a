pub mod alerts;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod rest;
pub mod schedule;
