//! Application layer services.
//!
//! Services combine the domain components with the repository traits into the
//! two request paths the rest of the system calls:
//!
//! - [`services::link_service::LinkService::create_short_link`] - creation path
//! - [`services::link_service::LinkService::resolve_for_redirect`] - redirect path

pub mod services;
