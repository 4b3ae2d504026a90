pub mod deadline;
pub mod serde;
