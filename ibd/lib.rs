#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod compare;
pub mod config;
pub mod data;
pub mod identity;
pub mod inference;
pub mod likelihood;
pub mod prior;
pub mod progress;
pub mod report;
pub mod sampler;
pub mod series;
pub mod special;
pub mod trace;
