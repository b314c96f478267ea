// Fragment storage: the byte-keyed map shared by download sessions and the pull service.

pub mod disk;
pub mod memory;
pub mod traits;
