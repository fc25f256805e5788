//! Exit code constants for the flok CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, filesystem failure)
//! - 2: Corrupt lock state detected (strict mode)
//! - 4: Lock acquisition timed out

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or an underlying filesystem failure.
pub const USER_ERROR: i32 = 1;

/// Corrupt lock state: the lock file content is not a decimal counter.
pub const CORRUPT_STATE: i32 = 2;

/// Lock acquisition timed out before the lock became free.
pub const LOCK_TIMEOUT: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, CORRUPT_STATE, LOCK_TIMEOUT];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
    }
}
