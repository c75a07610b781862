//! EV charging decision engine for homes on calendar-hour demand tariffs.
//!
//! Once per cycle the controller turns live grid/solar/battery telemetry,
//! spot prices, a site power ceiling, and user overrides into per-vehicle
//! current/phase allocations, via a four-stage pipeline: safety, capacity
//! constraints, user intent, economic optimization.

pub mod api;
pub mod charger;
pub mod config;
pub mod controller;
pub mod domain;
pub mod pipeline;
pub mod telemetry;
