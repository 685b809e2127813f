pub const SUCCESS: i32 = 0;
/// Bad arguments, missing inputs, unreadable participants table
pub const INPUT_ERROR: i32 = 1;
/// Some recordings failed while others were processed
pub const PARTIAL_FAILURE: i32 = 2;
pub const EXECUTION_ERROR: i32 = 3;
