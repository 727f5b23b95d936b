#![allow(missing_docs)]

pub mod backend;
pub mod dataset;
pub mod error;
pub mod experiment;
pub mod model;
pub mod quant;
pub mod render;
