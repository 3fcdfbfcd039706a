//! Query validation and request signing: the security perimeter every
//! mutating request passes through before it reaches an adapter.

pub mod sanitizer;
pub mod signing;
