pub mod managementingress;

pub use managementingress::*;
