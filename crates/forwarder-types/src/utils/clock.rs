use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch. A clock set before 1970 reads as zero.
pub fn current_timestamp() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |elapsed| elapsed.as_secs())
}
