//! Export/import orchestration.
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | `graph` | category hierarchy and inclusion set |
//! | `registry` | explicit service discovery |
//! | `cancellation` | job key to cancellation token |
//! | `service` | the [`PortableService`] contract and its [`ServiceContext`] |
//! | `orchestrator` | level-by-level execution of one job invocation |

mod cancellation;
mod graph;
mod orchestrator;
mod registry;
mod service;

pub use cancellation::{CancellationRegistry, InMemoryCancellationRegistry};
pub use graph::{CategoryGraph, ServiceDescriptor, resolve_included};
pub use orchestrator::Orchestrator;
pub use registry::{ServiceFactory, ServiceRegistry};
pub use service::{PortableService, ServiceContext, TimeBudget};
