mod lease_sweeper;

pub use lease_sweeper::*;
