//! Custom domain activities

pub mod manage;
pub mod verify;

pub use manage::{
    add_domain, get_domain, list_domains, normalize_domain_name, remove_domain,
    request_verification, set_primary_domain,
};
pub use verify::verify_domain;
