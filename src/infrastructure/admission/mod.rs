pub mod controller;

pub use controller::AdmissionController;
