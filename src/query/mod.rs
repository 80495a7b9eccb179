//! Query contracts and the invocation pipeline
//!
//! # Architecture
//!
//! - **Contract**: declared parameters and result shape (`QueryContract`, `ParamDecl`)
//! - **Binding**: call arguments to bound parameters (`Args`, `BoundParams`, `bind`)
//! - **Hydrate**: rows to maps or entities (`EntityBuilder`, `Hydrated`)
//! - **Pagination**: lazy page collections with a cached total (`Pages`, `Page`)
//! - **Facade**: the per-contract callable that runs the pipeline and logs it (`QueryFacade`)
//! - **Registry**: validated, immutable set of façades (`QueryRegistry`)
//!
//! Control flow of one call: bind, then execute and hydrate (or hand back
//! lazy pages), then append one event to the query log.

pub mod binding;
pub mod contract;
pub mod facade;
pub mod hydrate;
pub mod pagination;
pub mod registry;

pub use binding::{bind, Args, BoundParams, CurrentTime, ParamBinding, UnixEpochTime, ValueProvider};
pub use contract::{ParamDecl, ParamType, QueryContract, ResultShape};
pub use facade::{QueryFacade, QueryOutput};
pub use hydrate::{hydrate, ConstructorArgs, EntityBuilder, ErasedEntityBuilder, Hydrated};
pub use pagination::{Page, PageSize, Pages, PagesIter};
pub use registry::{QueryRegistry, QueryRegistryBuilder};
