pub mod args;
pub mod bootstrap;
pub mod container;
pub mod crd;
pub mod error;
pub mod identity;
pub mod labels;
pub mod pidlog;
pub mod quantity;
pub mod report;
pub mod topology;

pub use args::{NodeArgs, NODE_BINARY};
pub use bootstrap::{
    Bootstrap, BootstrapOutcome, BootstrapPlan, NodeRuntime, Phase, StartupBarrier,
};
pub use crd::{EsRally, EsRallySpec};
pub use error::{ConstructionError, StartupError};
pub use identity::{coordinator_address, IdentityError, NodeIdentity, NodeRole};
pub use labels::LabelPolicy;
pub use pidlog::LogFormat;
pub use quantity::{QuantityError, StorageSize};
pub use report::{NodeStatus, RunOutcome, RunReport};
pub use topology::Topology;
