//! Server discovery and monitoring: classifying servers, probing them on a
//! schedule, folding updates into a cluster-wide snapshot, and selecting a
//! server against that snapshot for an operation to use.

mod description;
mod monitor;
mod server_selection;
mod topology;

pub use description::{ServerInfo, ServerType};
pub(crate) use description::ClusterDescription;
pub(crate) use topology::Topology;
