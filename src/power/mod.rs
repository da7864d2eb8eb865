pub mod balancer;
pub mod resistance;
pub mod session;
pub mod strategy;
pub mod thevenin;
pub mod thevenin_method;
