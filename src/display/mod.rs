pub mod snapshot;

pub use snapshot::SnapshotWriter;
