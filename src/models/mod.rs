pub mod appointment;
pub mod audit;
pub mod billing;
pub mod employee;
pub mod enums;
pub mod lab;
pub mod patient;
pub mod pharmacy;
pub mod radiology;
pub mod staff;
pub mod telemedicine;

pub use appointment::*;
pub use audit::*;
pub use billing::*;
pub use employee::*;
pub use lab::*;
pub use patient::*;
pub use pharmacy::*;
pub use radiology::*;
pub use staff::*;
pub use telemedicine::*;
