//! Infrastructure layer: storage engines and the application services built
//! on top of them.

pub mod accounts;
pub mod catalog;
pub mod enrollment;
pub mod revocation;
pub mod store;


pub use accounts::{AccountError, AccountService, Credentials, Session};
pub use catalog::{CatalogError, CatalogService};
pub use enrollment::{EnrollError, EnrollmentService};
pub use revocation::TokenRevocations;
