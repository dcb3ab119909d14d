// Domain layer: models and the capability ports the core drives.

pub mod model;
pub mod ports;
