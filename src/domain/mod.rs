// Domain layer: pipeline models and ports. External tools are reached only through the ports.

pub mod model;
pub mod ports;
