//! Authentication Module
//!
//! The identity-provider and document-store boundaries, the bootstrap
//! state machine with its readiness signal, the profile cache &
//! normalizer, and compensated account provisioning.

pub mod bootstrap;
pub mod profile;
pub mod provider;
pub mod provisioning;

pub use bootstrap::{AuthBootstrap, Readiness};
pub use profile::ProfileCache;
pub use provider::{user_document_path, DocumentEvent, DocumentStore, IdentityProvider, Principal};
pub use provisioning::{ProvisionedAccount, ProvisioningService, SecondaryProviderFactory};
