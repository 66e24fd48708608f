// Configuration loading: global settings, service registry, test cases.

pub mod global;
pub mod services;
pub mod sorting;
pub mod test_cases;

pub use global::{Global, LogFormat};
pub use services::{CertConfig, Service, Services, TlsSettings, load_services};
pub use sorting::{filter_target, sort};
pub use test_cases::{StatusExpectation, Step, TestCase, load_test_cases};
