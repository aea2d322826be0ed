pub mod protocol;
pub mod types;

pub use protocol::{
    CHECK_DELIMITER, PROBE_HEADER, PROBE_VERSION, REPAIR_DELIMITER, RESULT_DELIMITER,
    validate_instance_name,
};
pub use types::*;
